//! `BroadcastChannel` transport between the DM tab and player tabs.

use std::cell::RefCell;

use bytes::Bytes;
use tabletop_engine::{EngineError, Transport};
use tabletop_shared::MAP_CHANNEL_NAME;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{BroadcastChannel, MessageEvent};

fn open_channel() -> tabletop_engine::Result<BroadcastChannel> {
    BroadcastChannel::new(MAP_CHANNEL_NAME).map_err(|e| EngineError::TransportUnavailable {
        reason: format!("{e:?}"),
    })
}

/// Publish side, owned by the DM session.
pub struct ChannelTransport {
    channel: BroadcastChannel,
}

impl ChannelTransport {
    /// `None` when the browser has no `BroadcastChannel`; the DM window then
    /// runs without replication.
    pub fn open() -> Option<Self> {
        match open_channel() {
            Ok(channel) => Some(Self { channel }),
            Err(e) => {
                web_sys::console::warn_1(&e.to_string().into());
                None
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn publish(&self, frame: Bytes) -> tabletop_engine::Result<()> {
        let text = std::str::from_utf8(&frame)
            .map_err(|e| EngineError::Publish(format!("frame is not utf-8: {e}")))?;
        self.channel
            .post_message(&JsValue::from_str(text))
            .map_err(|e| EngineError::Publish(format!("{e:?}")))
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.channel.close();
    }
}

struct ChannelListener {
    channel: BroadcastChannel,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
}

impl ChannelListener {
    fn close(self) {
        self.channel.set_onmessage(None);
        self.channel.close();
    }
}

thread_local! {
    static CHANNEL_LISTENER: RefCell<Option<ChannelListener>> = const { RefCell::new(None) };
}

/// Subscribe the player window. Replaces any previous listener.
pub fn listen(mut on_frame: impl FnMut(&[u8]) + 'static) -> bool {
    disconnect();
    let channel = match open_channel() {
        Ok(channel) => channel,
        Err(e) => {
            web_sys::console::warn_1(&e.to_string().into());
            return false;
        }
    };
    let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        match event.data().as_string() {
            Some(text) => on_frame(text.as_bytes()),
            None => web_sys::console::warn_1(&"ignoring non-text map frame".into()),
        }
    });
    channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    CHANNEL_LISTENER.with(|slot| {
        *slot.borrow_mut() = Some(ChannelListener {
            channel,
            _on_message: on_message,
        });
    });
    true
}

pub fn disconnect() {
    CHANNEL_LISTENER.with(|slot| {
        if let Some(listener) = slot.borrow_mut().take() {
            listener.close();
        }
    });
}
