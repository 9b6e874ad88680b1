use tabletop_engine::fog::raster::{FOGGED, REVEALED};
use tabletop_engine::{
    AuthoritySession, EngineConfig, LocalBus, RecordingSurface, ReplicaSession, SurfaceCall,
};
use tabletop_shared::mapset::{MapSetData, SessionData};
use tabletop_shared::{
    Combatant, ContainerSize, MapCatalog, MapDescriptor, MapPoint, MapRef, MaskState,
    SpellEffectPreview, Token,
};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;

type Dm = AuthoritySession<LocalBus, RecordingSurface>;
type Player = ReplicaSession<RecordingSurface>;

const ARENA: u32 = 2000;

fn descriptor(id: &str, width: u32, height: u32) -> MapDescriptor {
    MapDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        image_url: format!("/maps/{id}.png"),
        width: Some(width),
        height: Some(height),
    }
}

fn catalog() -> MapCatalog {
    MapCatalog::new(
        MapSetData {
            world: Some(descriptor("world", 4000, 3000)),
            city: Some(descriptor("city", 3000, 2000)),
            ..MapSetData::default()
        },
        SessionData {
            combat_maps: vec![descriptor("arena", ARENA, ARENA)],
            ..SessionData::default()
        },
    )
}

fn arena() -> MapRef {
    MapRef::Combat("arena".to_string())
}

/// DM window, one player window, and the player's end of the bus.
fn table(capacity: usize) -> (Dm, Player, Receiver<bytes::Bytes>) {
    let bus = LocalBus::new(capacity);
    let rx = bus.subscribe();
    let dm = AuthoritySession::mount(
        EngineConfig::default(),
        Some(bus),
        catalog(),
        RecordingSurface::new(),
        ContainerSize::new(1000.0, 800.0),
    )
    .expect("mount dm");
    let player = ReplicaSession::new(
        EngineConfig::default(),
        catalog(),
        RecordingSurface::new(),
        ContainerSize::new(1920.0, 1080.0),
    );
    (dm, player, rx)
}

/// Deliver everything queued; returns how many frames were applied.
fn drain(rx: &mut Receiver<bytes::Bytes>, player: &mut Player) -> usize {
    let mut applied = 0;
    loop {
        match rx.try_recv() {
            Ok(frame) => {
                if player.receive_frame(&frame).expect("receive") {
                    applied += 1;
                }
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return applied,
        }
    }
}

fn collect_masks(rx: &mut Receiver<bytes::Bytes>, player: &mut Player) -> Vec<MaskState> {
    let mut masks = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        player.receive_frame(&frame).expect("receive");
        masks.push(player.state().fog_of_war.revealed_mask.clone());
    }
    masks
}

fn player_fog(player: &Player) -> (&tabletop_engine::FogRaster, f64) {
    let (raster, opacity) = player.surface().fog.as_ref().expect("fog overlay shown");
    (raster, *opacity)
}

/// Map pixel -> `[lat, lng]` on the arena.
fn at(x: f64, y: f64) -> [f64; 2] {
    MapPoint::new(x, y).to_lat_lng(ARENA as f64)
}

#[test]
fn scenario_a_combat_map_locks_replica_zoom() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.switch_map(arena()).expect("switch");
    drain(&mut rx, &mut player);

    let fitted = dm.viewport().fitted_zoom();
    let dm_policy = dm.interaction().copied().expect("dm policy");
    assert!(!dm_policy.accepts_input());
    assert_eq!(dm_policy.min_zoom, fitted);

    let policy = player.interaction().copied().expect("player policy");
    assert!(!policy.dragging);
    assert_eq!(policy.min_zoom, fitted);
    assert_eq!(policy.max_zoom, fitted);
    assert_eq!(player.surface().view.as_ref().map(|v| v.zoom), Some(fitted));
    assert_eq!(player.surface().base_image.as_deref(), Some("/maps/arena.png"));

    // 1000x800 DM surface in a 1920x1080 window.
    let letterbox = player.surface().letterbox.expect("letterbox");
    assert_eq!(letterbox.scale, 1.35);
    assert_eq!(letterbox.offset_y, 0.0);
}

#[test]
fn scenario_b_first_enabled_fog_is_fully_opaque() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.switch_map(arena()).expect("switch");
    dm.set_fog_enabled(true).expect("enable");
    drain(&mut rx, &mut player);

    assert_eq!(player.state().fog_of_war.revealed_mask, MaskState::FullyFogged);
    let (raster, opacity) = player_fog(&player);
    assert_eq!(opacity, 1.0);
    assert_eq!(raster.revealed_fraction(), 0.0);
    assert_eq!((raster.width(), raster.height()), (ARENA, ARENA));
}

#[test]
fn scenario_c_one_stroke_is_one_broadcast() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.switch_map(arena()).expect("switch");
    dm.set_fog_enabled(true).expect("enable");
    assert!(dm.set_fog_drawing(true).expect("draw mode"));
    assert_eq!(dm.set_brush_size(80.0).expect("brush"), 80.0);
    drain(&mut rx, &mut player);

    assert!(dm.pointer_down(at(500.0, 500.0)));
    assert!(rx.is_empty(), "stroke start must stay local");
    assert!(dm.global_pointer_up().expect("release"));
    assert!(!dm.global_pointer_up().expect("second release"));

    let masks = collect_masks(&mut rx, &mut player);
    assert_eq!(masks.len(), 1);
    assert!(matches!(masks[0], MaskState::Partial(_)));

    let (raster, _) = player_fog(&player);
    assert_eq!(raster.get(500, 500), Some(REVEALED));
    assert_eq!(raster.get(579, 500), Some(REVEALED));
    assert_eq!(raster.get(500, 420), Some(REVEALED));
    assert_eq!(raster.get(582, 500), Some(FOGGED));
    assert_eq!(raster.get(500, 417), Some(FOGGED));
}

#[test]
fn stroke_moves_draw_locally_and_commit_once() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.switch_map(arena()).expect("switch");
    dm.set_fog_enabled(true).expect("enable");
    dm.set_fog_drawing(true).expect("draw mode");
    drain(&mut rx, &mut player);
    dm.surface_mut().clear_calls();

    dm.pointer_down(at(100.0, 100.0));
    for (i, x) in [140.0, 180.0, 220.0, 260.0].into_iter().enumerate() {
        dm.pointer_move(at(x, 100.0), i as f64 * 10.0);
    }
    let discs = dm.surface().count(|c| matches!(c, SurfaceCall::Disc { .. }));
    let refreshes = dm
        .surface()
        .count(|c| matches!(c, SurfaceCall::OverlayImage { .. }));
    assert!(discs > 4);
    assert_eq!(refreshes, 1, "local refresh is throttled");
    assert!(rx.is_empty());

    dm.pointer_up().expect("release");
    assert_eq!(collect_masks(&mut rx, &mut player).len(), 1);
    let (raster, _) = player_fog(&player);
    assert_eq!(raster.get(260, 100), Some(REVEALED));
}

#[test]
fn scenario_d_reveal_all_clears_history() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.switch_map(arena()).expect("switch");
    dm.set_fog_enabled(true).expect("enable");
    dm.set_fog_drawing(true).expect("draw mode");
    for x in [300.0, 900.0, 1500.0] {
        dm.pointer_down(at(x, x));
        dm.pointer_up().expect("release");
    }
    dm.reveal_all().expect("reveal all");
    drain(&mut rx, &mut player);

    assert_eq!(player.state().fog_of_war.revealed_mask, MaskState::FullyRevealed);
    let (raster, _) = player_fog(&player);
    assert_eq!(raster.revealed_fraction(), 1.0);

    dm.hide_all().expect("hide all");
    drain(&mut rx, &mut player);
    assert_eq!(player_fog(&player).0.revealed_fraction(), 0.0);
}

#[test]
fn scenario_e_cancelled_preview_leaves_effects_alone() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.place_spell_preview(SpellEffectPreview {
        kind: "web".to_string(),
        position: [1000.0, 1000.0],
        radius: 60.0,
        color: "#cccccc".to_string(),
    })
    .expect("preview");
    drain(&mut rx, &mut player);
    assert!(player.state().spell_effect_preview.is_some());
    assert!(player.surface().nodes.contains_key("spell-preview"));

    assert!(dm.cancel_spell_preview().expect("cancel"));
    drain(&mut rx, &mut player);
    assert!(player.state().spell_effects.is_empty());
    assert!(player.state().spell_effect_preview.is_none());
    assert!(!player.surface().nodes.contains_key("spell-preview"));
}

#[test]
fn replica_matches_authority_after_any_edit_sequence() {
    let (mut dm, mut player, mut rx) = table(4);
    dm.switch_map(arena()).expect("switch");
    dm.start_encounter(
        vec![
            Token {
                id: "t-hero".to_string(),
                name: "Hero".to_string(),
                position: [100.0, 100.0],
                image_url: "/tokens/hero.png".to_string(),
                is_player: true,
                size: 50.0,
            },
            Token {
                id: "t-orc".to_string(),
                name: "Orc".to_string(),
                position: [300.0, 300.0],
                image_url: "/tokens/orc.png".to_string(),
                is_player: false,
                size: 60.0,
            },
        ],
        vec![
            Combatant {
                id: "c-orc".to_string(),
                name: "Orc".to_string(),
                initiative: 17,
                is_dead: false,
                token_id: Some("t-orc".to_string()),
            },
            Combatant {
                id: "c-hero".to_string(),
                name: "Hero".to_string(),
                initiative: 12,
                is_dead: false,
                token_id: Some("t-hero".to_string()),
            },
        ],
    )
    .expect("encounter");
    let marker = dm.add_marker([500.0, 500.0], "Altar").expect("marker");
    dm.move_token("t-hero", [150.0, 120.0]).expect("move");
    dm.advance_turn().expect("turn");
    dm.add_waypoint([0.0, 0.0]).expect("waypoint");
    dm.add_waypoint([400.0, 800.0]).expect("waypoint");
    dm.set_route_visibility(true).expect("share route");
    dm.place_spell_preview(SpellEffectPreview {
        kind: "fireball".to_string(),
        position: [700.0, 700.0],
        radius: 100.0,
        color: "#ff4400".to_string(),
    })
    .expect("preview");
    let effect = dm.confirm_spell_preview().expect("confirm").expect("effect id");
    dm.resize_spell_effect(&effect, 140.0).expect("resize");
    dm.set_combatant_dead("c-orc", true).expect("dead");
    assert!(dm.remove_marker(&marker).expect("remove"));
    drain(&mut rx, &mut player);

    assert_eq!(player.state(), dm.state());
    assert_eq!(player.seq(), dm.store().seq());

    let orc = player.surface().nodes.get("token:t-orc").expect("orc node");
    assert!(orc.controls.is_empty());
    assert_eq!(player.surface().nodes.len(), dm.surface().nodes.len());
}

#[test]
fn repeated_mask_is_not_redrawn() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.switch_map(arena()).expect("switch");
    dm.set_fog_enabled(true).expect("enable");
    dm.set_fog_drawing(true).expect("draw mode");
    dm.pointer_down(at(800.0, 800.0));
    dm.pointer_up().expect("release");
    drain(&mut rx, &mut player);
    let before = player_fog(&player).0.clone();
    player.surface_mut().clear_calls();

    // Keepalive republishes carry the same mask under a new sequence number.
    dm.tick(0.0).expect("tick");
    dm.tick(5_000.0).expect("tick");
    assert_eq!(drain(&mut rx, &mut player), 2);
    assert_eq!(
        player
            .surface()
            .count(|c| matches!(c, SurfaceCall::OverlayImage { .. })),
        0
    );
    assert_eq!(player_fog(&player).0, &before);
}

#[test]
fn late_replica_is_seeded_by_keepalive() {
    let bus = LocalBus::new(16);
    let mut dm = AuthoritySession::mount(
        EngineConfig::default(),
        Some(bus.clone()),
        catalog(),
        RecordingSurface::new(),
        ContainerSize::new(1000.0, 800.0),
    )
    .expect("mount");
    dm.switch_map(MapRef::City).expect("city");

    let mut rx = bus.subscribe();
    let mut player: Player = ReplicaSession::new(
        EngineConfig::default(),
        catalog(),
        RecordingSurface::new(),
        ContainerSize::new(800.0, 600.0),
    );
    assert_eq!(drain(&mut rx, &mut player), 0);
    assert!(player.is_loading());

    dm.tick(0.0).expect("keepalive");
    assert_eq!(drain(&mut rx, &mut player), 1);
    assert!(!player.is_loading());
    assert_eq!(player.state().current_map_id, MapRef::City);
}

#[test]
fn dm_resize_with_unchanged_zoom_still_moves_letterbox() {
    let (mut dm, mut player, mut rx) = table(64);
    dm.switch_map(arena()).expect("switch");
    drain(&mut rx, &mut player);
    let zoom = dm.viewport().fitted_zoom();
    assert_eq!(player.surface().letterbox.expect("letterbox").width, 1000.0);

    // 1400x800 fits the arena at the same snapped zoom.
    dm.container_resized(ContainerSize::new(1400.0, 800.0), 0.0);
    dm.tick(100.0).expect("flush");
    drain(&mut rx, &mut player);

    assert_eq!(dm.viewport().fitted_zoom(), zoom);
    let letterbox = player.surface().letterbox.expect("letterbox");
    assert_eq!(
        player.state().dm_container_size,
        Some(ContainerSize::new(1400.0, 800.0))
    );
    assert_eq!((letterbox.width, letterbox.height), (1400.0, 800.0));
    assert_eq!(
        letterbox,
        tabletop_engine::Letterbox::compute(
            ContainerSize::new(1400.0, 800.0),
            ContainerSize::new(1920.0, 1080.0),
        )
        .expect("expected letterbox")
    );
}

#[test]
fn reloaded_dm_is_followed_even_when_its_first_frame_is_missed() {
    let (mut first, mut player, mut rx) = table(64);
    for n in 0..4 {
        first
            .add_marker([n as f64 * 10.0, 0.0], "Camp")
            .expect("marker");
    }
    drain(&mut rx, &mut player);
    assert_eq!(player.state(), first.state());
    drop(first);

    // The reloaded window publishes its mount snapshot before the player hears it.
    let bus = LocalBus::new(64);
    let mut second = AuthoritySession::mount(
        EngineConfig::default(),
        Some(bus.clone()),
        catalog(),
        RecordingSurface::new(),
        ContainerSize::new(1000.0, 800.0),
    )
    .expect("mount reloaded dm");
    let mut rx = bus.subscribe();
    second.switch_map(MapRef::City).expect("city");
    second.tick(0.0).expect("keepalive");

    assert_eq!(drain(&mut rx, &mut player), 2);
    assert_eq!(player.state(), second.state());
    assert_eq!(player.state().current_map_id, MapRef::City);
}
