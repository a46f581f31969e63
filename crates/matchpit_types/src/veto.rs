//! The veto state blob: canonical steps, actions taken, and the derived
//! picked-map projection.
//!
//! This module only holds the typed shape of the blob and its viewer-relative
//! summary. The transition rules (who may act, what a step accepts) live in
//! the core crate's sequencer.

use serde::{Deserialize, Serialize};

/// Current version of the serialized veto blob shape.
pub const VETO_STATE_VERSION: u32 = 1;

/// Which of a match's two sides a step or decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSlot {
    One,
    Two,
}

impl TeamSlot {
    pub fn other(&self) -> TeamSlot {
        match self {
            TeamSlot::One => TeamSlot::Two,
            TeamSlot::Two => TeamSlot::One,
        }
    }
}

/// Starting side on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Ct,
    T,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::Ct => Side::T,
            Side::T => Side::Ct,
        }
    }
}

/// The kind of decision a canonical step requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoActionKind {
    Ban,
    Pick,
    PickSide,
}

/// One entry in the fixed, format-specific veto order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoStep {
    pub owner: TeamSlot,
    pub kind: VetoActionKind,
}

impl VetoStep {
    pub fn new(owner: TeamSlot, kind: VetoActionKind) -> Self {
        Self { owner, kind }
    }
}

/// A concrete decision recorded against a canonical step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoDecision {
    Ban { map: String },
    Pick { map: String },
    Side { side: Side },
}

/// An action taken, appended in strict step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoAction {
    pub step_index: usize,
    pub owner: TeamSlot,
    pub decision: VetoDecision,
}

/// A map that survived the veto, in play order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickedMap {
    pub map: String,
    /// 1-based play order.
    pub number: u32,
    /// Which slot picked it; `None` for the auto-appended decider.
    pub picked_by: Option<TeamSlot>,
    /// Starting side of team one; team two starts on the opposite side.
    pub side_team_one: Option<Side>,
    /// Set when no side was chosen and the map starts with a knife round.
    pub knife_round: bool,
}

/// Overall progress of a veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoStatus {
    Pending,
    InProgress,
    Completed,
}

/// The full veto blob stored on a match.
///
/// Invariant: `actions` is append-only and applied strictly in step order;
/// the veto is complete exactly when `actions.len() == steps.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoState {
    pub version: u32,
    pub steps: Vec<VetoStep>,
    pub actions: Vec<VetoAction>,
    pub picked_maps: Vec<PickedMap>,
    pub status: VetoStatus,
}

impl VetoState {
    pub fn new(steps: Vec<VetoStep>) -> Self {
        Self {
            version: VETO_STATE_VERSION,
            steps,
            actions: Vec::new(),
            picked_maps: Vec::new(),
            status: VetoStatus::Pending,
        }
    }

    /// The step the next action must satisfy, if any remain.
    pub fn current_step(&self) -> Option<&VetoStep> {
        self.steps.get(self.actions.len())
    }

    pub fn is_complete(&self) -> bool {
        self.status == VetoStatus::Completed
    }

    /// Maps banned or picked so far, used to derive the remaining pool.
    pub fn consumed_maps(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match &a.decision {
                VetoDecision::Ban { map } | VetoDecision::Pick { map } => Some(map.as_str()),
                VetoDecision::Side { .. } => None,
            })
            .collect()
    }

    /// Team-relative view of the veto for one participant.
    ///
    /// A viewer on slot two sees side fields mirrored, so both participants
    /// read the summary the same way ("your side", not "team one's side").
    pub fn summary_for(&self, viewer: TeamSlot) -> VetoSummary {
        let maps = self
            .picked_maps
            .iter()
            .map(|p| {
                let your_side = p.side_team_one.map(|s| match viewer {
                    TeamSlot::One => s,
                    TeamSlot::Two => s.other(),
                });
                PickedMapView {
                    map: p.map.clone(),
                    number: p.number,
                    picked_by_you: p.picked_by.map(|slot| slot == viewer),
                    your_side,
                    opponent_side: your_side.map(|s| s.other()),
                    knife_round: p.knife_round,
                }
            })
            .collect();
        VetoSummary {
            status: self.status,
            steps_taken: self.actions.len(),
            steps_total: self.steps.len(),
            your_turn: self.current_step().map(|s| s.owner == viewer),
            maps,
        }
    }
}

/// Viewer-relative veto summary, see [`VetoState::summary_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoSummary {
    pub status: VetoStatus,
    pub steps_taken: usize,
    pub steps_total: usize,
    /// `None` once the veto is complete.
    pub your_turn: Option<bool>,
    pub maps: Vec<PickedMapView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickedMapView {
    pub map: String,
    pub number: u32,
    pub picked_by_you: Option<bool>,
    pub your_side: Option<Side>,
    pub opponent_side: Option<Side>,
    pub knife_round: bool,
}
