//! JSON protocol for driving an encounter from another process.
//!
//! The `play` subcommand speaks JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** Responses and encounter state
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready","version":"1.0"}`
//! 2. Controller loads a scenario with `load`
//! 3. Controller sends intents for the acting combatant, or `ai` to let the
//!    scenario's tactic play the current turn
//! 4. Every resolved command answers with the new log lines and the state
//! 5. When the fight ends, outputs `{"type":"game_over",...}`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0"}
//! -> {"cmd":"load","scenario":"alley_ambush","seed":7}
//! <- {"type":"state","round":0,"current":1,...}
//! -> {"cmd":"move","x":3,"y":2}
//! <- {"type":"resolved","events":["V moves to (3, 2)"],"state":{...}}
//! -> {"cmd":"end_turn"}
//! <- {"type":"resolved","events":["V ends turn"],"state":{...}}
//! -> {"cmd":"quit"}
//! <- {"type":"bye"}
//! ```

use neon_core::prelude::{
    CombatRng, Combatant, CombatantId, Encounter, EncounterPhase, EscapeMethod, GridPos, Intent,
    ItemKind, ItemStack, Team, Victor,
};
use serde::{Deserialize, Serialize};

/// Protocol version reported in the ready message.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Commands (Controller -> Runner)
// ============================================================================

/// Commands that can be sent to the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Load a scenario (built-in name or RON path) and start the encounter.
    Load {
        scenario: String,
        #[serde(default)]
        seed: u64,
    },

    /// Query the current state without acting.
    Query,

    /// Move the acting combatant.
    Move { x: i32, y: i32 },

    /// Attack a combatant by id.
    Attack { target: usize },

    /// Use a carried item on a combatant by id.
    UseItem { item: ItemKind, target: usize },

    /// End the acting combatant's turn.
    EndTurn,

    /// Attempt a retreat. With `sacrifice`, that member covers the others.
    Escape {
        #[serde(default)]
        sacrifice: Option<usize>,
    },

    /// Let the scenario's tactic play the current turn (default: 1 turn).
    Ai {
        #[serde(default = "default_turns")]
        turns: u32,
    },

    /// Report the current state hash (for determinism verification).
    Hash,

    /// Save a replay of everything resolved so far.
    SaveReplay { path: String },

    /// Quit the session.
    Quit,
}

fn default_turns() -> u32 {
    1
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept commands.
    Ready { version: String },

    /// Acknowledgment of a command with nothing else to report.
    Ack { cmd: String },

    /// Error processing a command. Errors never end the session.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cmd: Option<String>,
    },

    /// Current encounter state.
    State(EncounterState),

    /// A command was resolved: new combat log lines plus the resulting state.
    Resolved {
        events: Vec<String>,
        state: EncounterState,
    },

    /// The encounter has ended.
    GameOver { victor: Victor, rounds: u32 },

    /// State hash for determinism verification.
    StateHash { round: u32, hash: u64 },

    /// Goodbye message before shutdown.
    Bye,
}

// ============================================================================
// State Types
// ============================================================================

/// Snapshot of an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterState {
    pub scenario: String,
    pub round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    pub phase: EncounterPhase,
    pub escape_available: bool,
    pub turn_order: Vec<usize>,
    pub combatants: Vec<CombatantState>,
    pub hash: u64,
}

impl EncounterState {
    /// Capture the state of `encounter`.
    #[must_use]
    pub fn capture<R: CombatRng>(scenario: &str, encounter: &Encounter<R>) -> Self {
        Self {
            scenario: scenario.to_string(),
            round: encounter.turn_count(),
            current: encounter.current_id().map(|id| id.0),
            phase: encounter.phase(),
            escape_available: encounter.escape_available(),
            turn_order: encounter.turn_order().iter().map(|id| id.0).collect(),
            combatants: encounter
                .combatants()
                .iter()
                .map(CombatantState::from)
                .collect(),
            hash: encounter.state_hash(),
        }
    }
}

/// State of a single combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantState {
    pub id: usize,
    pub name: String,
    pub team: Team,
    pub x: i32,
    pub y: i32,
    pub hp: u32,
    pub max_hp: u32,
    pub ap: u32,
    pub morale: u32,
    pub alive: bool,
    pub weapon: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemStack>,
}

impl From<&Combatant> for CombatantState {
    fn from(c: &Combatant) -> Self {
        Self {
            id: c.id().0,
            name: c.name().to_string(),
            team: c.team(),
            x: c.position().x,
            y: c.position().y,
            hp: c.hp(),
            max_hp: c.max_hp(),
            ap: c.ap(),
            morale: c.morale(),
            alive: c.is_alive(),
            weapon: c.weapon().name.clone(),
            items: c.items().iter().copied().filter(|s| s.count > 0).collect(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    pub fn ready() -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Create an acknowledgment.
    pub fn ack(cmd: &str) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","message":"Serialization failed: {}"}}"#,
                e
            )
        });
        json.push('\n');
        json
    }
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get command name for acknowledgment.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::Query => "query",
            Self::Move { .. } => "move",
            Self::Attack { .. } => "attack",
            Self::UseItem { .. } => "use_item",
            Self::EndTurn => "end_turn",
            Self::Escape { .. } => "escape",
            Self::Ai { .. } => "ai",
            Self::Hash => "hash",
            Self::SaveReplay { .. } => "save_replay",
            Self::Quit => "quit",
        }
    }

    /// The core intent this command maps to, if it is one.
    pub fn intent(&self) -> Option<Intent> {
        let intent = match *self {
            Self::Move { x, y } => Intent::Move {
                to: GridPos::new(x, y),
            },
            Self::Attack { target } => Intent::Attack {
                target: CombatantId(target),
            },
            Self::UseItem { item, target } => Intent::UseItem {
                item,
                target: CombatantId(target),
            },
            Self::EndTurn => Intent::EndTurn,
            Self::Escape { sacrifice } => Intent::Escape {
                method: match sacrifice {
                    Some(member) => EscapeMethod::Sacrifice {
                        member: CombatantId(member),
                    },
                    None => EscapeMethod::Solo,
                },
            },
            _ => return None,
        };
        Some(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neon_core::prelude::{catalog, Attributes, Grid, SeededRng};

    #[test]
    fn test_parse_load_command() {
        let cmd = Command::from_json(r#"{"cmd":"load","scenario":"alley_ambush"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Load {
                scenario: "alley_ambush".to_string(),
                seed: 0
            }
        );
    }

    #[test]
    fn test_parse_intents() {
        let cmd = Command::from_json(r#"{"cmd":"attack","target":3}"#).unwrap();
        assert_eq!(
            cmd.intent(),
            Some(Intent::Attack {
                target: CombatantId(3)
            })
        );

        let cmd = Command::from_json(r#"{"cmd":"use_item","item":"Stim","target":0}"#).unwrap();
        assert_eq!(
            cmd.intent(),
            Some(Intent::UseItem {
                item: ItemKind::Stim,
                target: CombatantId(0)
            })
        );

        let cmd = Command::from_json(r#"{"cmd":"escape","sacrifice":1}"#).unwrap();
        assert_eq!(
            cmd.intent(),
            Some(Intent::Escape {
                method: EscapeMethod::Sacrifice {
                    member: CombatantId(1)
                }
            })
        );

        assert_eq!(Command::Query.intent(), None);
    }

    #[test]
    fn test_default_ai_turns() {
        let cmd = Command::from_json(r#"{"cmd":"ai"}"#).unwrap();
        assert_eq!(cmd, Command::Ai { turns: 1 });
        assert_eq!(cmd.name(), "ai");
    }

    #[test]
    fn test_serialize_responses() {
        let json = Response::ready().to_json_line();
        assert_eq!(json, "{\"type\":\"ready\",\"version\":\"1.0\"}\n");

        let json = Response::GameOver {
            victor: Victor::Fled,
            rounds: 4,
        }
        .to_json_line();
        assert!(json.contains(r#""type":"game_over""#));
        assert!(json.contains(r#""victor":"Fled""#));

        let json = Response::error("bad", None).to_json_line();
        assert!(!json.contains("cmd"));
    }

    #[test]
    fn test_state_snapshot() {
        let players = vec![Combatant::new(
            "V",
            Team::Player,
            Attributes::default(),
            100,
            0,
            catalog::pistol(),
        )];
        let enemies = vec![Combatant::new(
            "Grunt",
            Team::Enemy,
            Attributes::default(),
            60,
            0,
            catalog::combat_knife(),
        )
        .at(5, 5)];
        let encounter = Encounter::new(players, enemies, Grid::default(), SeededRng::new(1)).unwrap();

        let state = EncounterState::capture("Test", &encounter);
        assert_eq!(state.round, 0);
        assert_eq!(state.phase, EncounterPhase::Active);
        assert_eq!(state.combatants.len(), 2);
        assert_eq!(state.combatants[1].name, "Grunt");
        assert_eq!((state.combatants[1].x, state.combatants[1].y), (5, 5));
        assert_eq!(state.hash, encounter.state_hash());

        let json = Response::State(state.clone()).to_json_line();
        assert!(json.contains(r#""type":"state""#));
        let back: Response = serde_json::from_str(json.trim()).unwrap();
        assert_eq!(back, Response::State(state));
    }

    #[test]
    fn test_combatant_without_items_reads_back() {
        let grunt = Combatant::new(
            "Grunt",
            Team::Enemy,
            Attributes::default(),
            60,
            0,
            catalog::pistol(),
        );
        let state = CombatantState::from(&grunt);
        assert!(state.items.is_empty());

        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("items"));
        let back: CombatantState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
