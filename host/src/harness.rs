//! Single-process table: one DM session and N player sessions over the
//! in-process bus, each player on its own task.

use anyhow::Context;
use bytes::Bytes;
use tabletop_engine::fog::codec;
use tabletop_engine::{AuthoritySession, LocalBus, RecordingSurface, ReplicaSession};
use tabletop_shared::{ContainerSize, MapCatalog, MapPoint, MapState};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

use crate::config::{HarnessSettings, replica_container};
use crate::script::{Script, Step};

type Dm = AuthoritySession<LocalBus, RecordingSurface>;
type Player = ReplicaSession<RecordingSurface>;

/// Simulated time between pointer-move samples of a scripted stroke.
const POINTER_SAMPLE_MS: f64 = 16.0;

#[derive(Debug)]
pub struct ReplicaReport {
    pub index: usize,
    pub applied: usize,
    pub skipped: u64,
    pub seq: u64,
    pub converged: bool,
    pub revealed_fraction: Option<f64>,
}

#[derive(Debug)]
pub struct Outcome {
    pub authority_seq: u64,
    pub state: MapState,
    /// PNG of the DM's fog raster for the active map.
    pub mask_png: Option<Vec<u8>>,
    pub replicas: Vec<ReplicaReport>,
}

impl Outcome {
    pub fn log(&self) {
        info!(
            seq = self.authority_seq,
            map = %self.state.current_map_id,
            markers = self.state.markers.len(),
            tokens = self.state.tokens.len(),
            effects = self.state.spell_effects.len(),
            "authority finished script"
        );
        for replica in &self.replicas {
            info!(
                replica = replica.index,
                applied = replica.applied,
                skipped = replica.skipped,
                seq = replica.seq,
                converged = replica.converged,
                revealed = replica.revealed_fraction,
                "replica report"
            );
        }
    }

    pub fn ensure_converged(&self) -> anyhow::Result<()> {
        let diverged: Vec<usize> = self
            .replicas
            .iter()
            .filter(|r| !r.converged)
            .map(|r| r.index)
            .collect();
        if diverged.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("replicas {diverged:?} did not converge on the authority snapshot")
        }
    }
}

struct ReplicaRun {
    index: usize,
    session: Player,
    applied: usize,
    skipped: u64,
}

async fn run_replica(
    index: usize,
    mut session: Player,
    rx: broadcast::Receiver<Bytes>,
) -> ReplicaRun {
    let mut stream = BroadcastStream::new(rx);
    let mut applied = 0;
    let mut skipped = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(frame) => match session.receive_frame(&frame) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!(replica = index, error = %e, "replica rejected frame"),
            },
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                // Every frame is a full snapshot; the next one catches us up.
                skipped += n;
                warn!(replica = index, skipped = n, "replica lagged behind the bus");
            }
        }
    }
    debug!(replica = index, applied, "bus closed; replica stopping");
    ReplicaRun {
        index,
        session,
        applied,
        skipped,
    }
}

pub async fn run(
    settings: &HarnessSettings,
    catalog: MapCatalog,
    script: Script,
) -> anyhow::Result<Outcome> {
    let bus = LocalBus::new(settings.engine.bus_capacity);

    let mut handles: Vec<JoinHandle<ReplicaRun>> = Vec::with_capacity(settings.replicas);
    for index in 0..settings.replicas {
        let session = ReplicaSession::new(
            settings.engine.clone(),
            catalog.clone(),
            RecordingSurface::new(),
            replica_container(index),
        );
        handles.push(tokio::spawn(run_replica(index, session, bus.subscribe())));
    }
    info!(replicas = settings.replicas, "player windows listening");

    let mut dm: Dm = AuthoritySession::mount(
        settings.engine.clone(),
        Some(bus),
        catalog,
        RecordingSurface::new(),
        settings.dm_container,
    )
    .context("mounting DM session")?;

    let mut clock = 0.0;
    for (i, step) in script.steps.into_iter().enumerate() {
        debug!(step = i, ?step, "running step");
        if let Err(e) = run_step(&mut dm, step, &mut clock) {
            warn!(step = i, error = %e, "step failed; continuing");
        }
        dm.tick(clock).context("timer tick")?;
        tokio::task::yield_now().await;
    }
    // Flush any pending debounce and send one last full snapshot.
    clock += settings.engine.keepalive_republish_ms;
    dm.tick(clock).context("final tick")?;
    dm.tick(clock + settings.engine.keepalive_republish_ms)
        .context("final keepalive")?;

    let state = dm.state().clone();
    let authority_seq = dm.store().seq();
    let mask_png = if state.fog_of_war.enabled {
        Some(codec::to_png(dm.fog().raster()).context("encoding fog mask")?)
    } else {
        None
    };
    // Dropping the session closes the bus and ends every replica stream.
    drop(dm);

    let mut replicas = Vec::with_capacity(handles.len());
    for handle in handles {
        let run = handle.await.context("replica task panicked")?;
        let revealed_fraction = run
            .session
            .surface()
            .fog
            .as_ref()
            .map(|(raster, _)| raster.revealed_fraction());
        replicas.push(ReplicaReport {
            index: run.index,
            applied: run.applied,
            skipped: run.skipped,
            seq: run.session.seq(),
            converged: run.session.state() == &state,
            revealed_fraction,
        });
    }

    Ok(Outcome {
        authority_seq,
        state,
        mask_png,
        replicas,
    })
}

fn run_step(dm: &mut Dm, step: Step, clock: &mut f64) -> tabletop_engine::Result<()> {
    match step {
        Step::SwitchMap { map } => dm.switch_map(map)?,
        Step::Resize { width, height } => {
            dm.container_resized(ContainerSize::new(width, height), *clock)
        }
        Step::Camera { view } => dm.camera_moved(view, *clock),
        Step::Fog { enabled } => dm.set_fog_enabled(enabled)?,
        Step::Drawing { enabled } => {
            if !dm.set_fog_drawing(enabled)? {
                warn!("draw mode ignored while fog is disabled");
            }
        }
        Step::Brush { size } => {
            dm.set_brush_size(size)?;
        }
        Step::Stroke {
            points,
            released_outside,
        } => stroke(dm, &points, released_outside, clock)?,
        Step::RevealAll => dm.reveal_all()?,
        Step::HideAll => dm.hide_all()?,
        Step::AddMarker { position, label } => {
            let id = dm.add_marker(position, &label)?;
            debug!(marker = %id, "marker placed");
        }
        Step::Encounter { tokens, combatants } => dm.start_encounter(tokens, combatants)?,
        Step::MoveToken { id, position } => dm.move_token(&id, position)?,
        Step::AdvanceTurn => {
            dm.advance_turn()?;
        }
        Step::SetDead { combatant, dead } => {
            dm.set_combatant_dead(&combatant, dead)?;
        }
        Step::Waypoint { position } => dm.add_waypoint(position)?,
        Step::ClearRoute => dm.clear_route()?,
        Step::RouteVisible { visible } => dm.set_route_visibility(visible)?,
        Step::SpellPreview { preview } => dm.place_spell_preview(preview)?,
        Step::ConfirmSpell => {
            if let Some(id) = dm.confirm_spell_preview()? {
                debug!(effect = %id, "spell confirmed");
            }
        }
        Step::CancelSpell => {
            dm.cancel_spell_preview()?;
        }
        Step::Grid { settings } => dm.set_grid(settings)?,
        Step::Weather { weather } => dm.set_weather(weather)?,
        Step::Wait { ms } => {
            let target = *clock + ms.max(0.0);
            while *clock < target {
                *clock = (*clock + POINTER_SAMPLE_MS).min(target);
                dm.tick(*clock)?;
            }
        }
    }
    Ok(())
}

fn stroke(
    dm: &mut Dm,
    points: &[[f64; 2]],
    released_outside: bool,
    clock: &mut f64,
) -> tabletop_engine::Result<()> {
    let height = dm.viewport().dims().height as f64;
    let to_lat_lng = |[x, y]: [f64; 2]| MapPoint::new(x, y).to_lat_lng(height);
    let Some((first, rest)) = points.split_first() else {
        return Ok(());
    };
    if !dm.pointer_down(to_lat_lng(*first)) {
        warn!("stroke ignored; fog draw mode is off or the start is off-map");
        return Ok(());
    }
    for point in rest {
        *clock += POINTER_SAMPLE_MS;
        dm.pointer_move(to_lat_lng(*point), *clock);
    }
    let committed = if released_outside {
        dm.global_pointer_up()?
    } else {
        dm.pointer_up()?
    };
    debug!(committed, "stroke finished");
    Ok(())
}
