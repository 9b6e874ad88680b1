//! DM action scripts replayed by the harness.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tabletop_shared::{
    Combatant, GridSettings, LatLng, MapRef, SpellEffectPreview, Token, ViewportState, Weather,
};

/// One DM action. Stroke points are map pixel coordinates (`[x, y]`, `y` down);
/// every other position is `[lat, lng]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    SwitchMap {
        map: MapRef,
    },
    Resize {
        width: f64,
        height: f64,
    },
    Camera {
        view: ViewportState,
    },
    Fog {
        enabled: bool,
    },
    Drawing {
        enabled: bool,
    },
    Brush {
        size: f64,
    },
    Stroke {
        points: Vec<[f64; 2]>,
        /// Release the pointer outside the map instead of over it.
        #[serde(default)]
        released_outside: bool,
    },
    RevealAll,
    HideAll,
    AddMarker {
        position: LatLng,
        #[serde(default)]
        label: String,
    },
    Encounter {
        tokens: Vec<Token>,
        combatants: Vec<Combatant>,
    },
    MoveToken {
        id: String,
        position: LatLng,
    },
    AdvanceTurn,
    SetDead {
        combatant: String,
        dead: bool,
    },
    Waypoint {
        position: LatLng,
    },
    ClearRoute,
    RouteVisible {
        visible: bool,
    },
    SpellPreview {
        preview: SpellEffectPreview,
    },
    ConfirmSpell,
    CancelSpell,
    Grid {
        settings: GridSettings,
    },
    Weather {
        weather: Weather,
    },
    /// Advance the harness clock; timers (debounce, keepalive) fire on the way.
    Wait {
        ms: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading script {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("parsing script {}", path.display()))
    }

    /// Built-in session: a world-map camera pan, then a combat round on the
    /// first combat map with fog strokes and a spell.
    pub fn demo() -> Self {
        let goblin = |id: &str, position: LatLng| Token {
            id: id.to_string(),
            name: "Goblin".to_string(),
            position,
            image_url: "/tokens/goblin.png".to_string(),
            is_player: false,
            size: 50.0,
        };
        let combatant = |id: &str, token: &str, initiative: i32| Combatant {
            id: id.to_string(),
            name: "Goblin".to_string(),
            initiative,
            is_dead: false,
            token_id: Some(token.to_string()),
        };

        Self {
            steps: vec![
                Step::AddMarker {
                    position: [1200.0, 800.0],
                    label: "Camp".to_string(),
                },
                Step::Waypoint {
                    position: [1200.0, 800.0],
                },
                Step::Waypoint {
                    position: [1500.0, 1300.0],
                },
                Step::RouteVisible { visible: true },
                Step::Camera {
                    view: ViewportState {
                        center: [1300.0, 1000.0],
                        zoom: -1.0,
                        bounds: None,
                    },
                },
                Step::Wait { ms: 100.0 },
                Step::SwitchMap {
                    map: MapRef::Combat("arena".to_string()),
                },
                Step::Encounter {
                    tokens: vec![goblin("t-1", [600.0, 600.0]), goblin("t-2", [700.0, 650.0])],
                    combatants: vec![combatant("c-1", "t-1", 15), combatant("c-2", "t-2", 9)],
                },
                Step::Fog { enabled: true },
                Step::Drawing { enabled: true },
                Step::Brush { size: 80.0 },
                Step::Stroke {
                    points: vec![[500.0, 500.0], [560.0, 520.0], [640.0, 560.0]],
                    released_outside: false,
                },
                Step::Stroke {
                    points: vec![[900.0, 1400.0], [1000.0, 1450.0]],
                    released_outside: true,
                },
                Step::Drawing { enabled: false },
                Step::SpellPreview {
                    preview: SpellEffectPreview {
                        kind: "fireball".to_string(),
                        position: [650.0, 620.0],
                        radius: 120.0,
                        color: "#ff5a1f".to_string(),
                    },
                },
                Step::ConfirmSpell,
                Step::SetDead {
                    combatant: "c-2".to_string(),
                    dead: true,
                },
                Step::AdvanceTurn,
                Step::Wait { ms: 2500.0 },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Script, Step};

    #[test]
    fn parses_tagged_steps() {
        let script: Script = serde_json::from_str(
            r#"{"steps":[
                {"action":"switch_map","map":"combat:arena"},
                {"action":"stroke","points":[[1,2],[3,4]]},
                {"action":"reveal_all"},
                {"action":"wait","ms":50}
            ]}"#,
        )
        .expect("script");
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(
            &script.steps[1],
            Step::Stroke {
                released_outside: false,
                ..
            }
        ));
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_str::<Script>(r#"{"steps":[{"action":"roll_dice"}]}"#).is_err());
    }

    #[test]
    fn demo_round_trips_through_json() {
        let demo = Script::demo();
        let json = serde_json::to_string(&demo).expect("serialize");
        assert_eq!(serde_json::from_str::<Script>(&json).expect("parse"), demo);
    }
}
