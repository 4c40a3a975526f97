use serde::{Deserialize, Serialize};

use crate::maze::GridPos;
use crate::player::PlayerId;

/// A collectible item. `collected` flips false→true exactly once;
/// `collected_by` is set at the same moment and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treasure {
    pub id: String,
    pub x: u32,
    pub z: u32,
    pub collected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_by: Option<PlayerId>,
}

impl Treasure {
    pub fn new(index: usize, cell: GridPos) -> Self {
        Self {
            id: format!("t{index}"),
            x: cell.x,
            z: cell.z,
            collected: false,
            collected_by: None,
        }
    }

    /// Center of the treasure's cell, in grid units.
    pub fn center(&self) -> (f32, f32) {
        (self.x as f32 + 0.5, self.z as f32 + 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncollected_omits_collector() {
        let t = Treasure::new(3, GridPos { x: 2, z: 5 });
        assert_eq!(t.id, "t3");
        let json: serde_json::Value = serde_json::to_value(&t).unwrap();
        assert_eq!(json["collected"], false);
        assert!(json.get("collectedBy").is_none());
    }

    #[test]
    fn collected_round_trips() {
        let mut t = Treasure::new(0, GridPos { x: 1, z: 1 });
        t.collected = true;
        t.collected_by = Some(4);
        let json = serde_json::to_string(&t).unwrap();
        let back: Treasure = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
