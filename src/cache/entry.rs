//! Memoization record

use serde::{Deserialize, Serialize};

use crate::snapshot::SnapshotId;

/// "Running `command` from exactly `input_state` produced `output_state` and
/// `output`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "cmd")]
    pub command: String,

    #[serde(rename = "inState")]
    pub input_state: SnapshotId,

    #[serde(rename = "outState")]
    pub output_state: SnapshotId,

    /// Captured output of the recorded execution
    pub output: String,
}

impl CacheEntry {
    pub fn new(
        command: impl Into<String>,
        input_state: SnapshotId,
        output_state: SnapshotId,
        output: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            input_state,
            output_state,
            output: output.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let entry = CacheEntry::new(
            "x lstart",
            SnapshotId::new("s0"),
            SnapshotId::new("s1"),
            "done",
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["cmd"], "x lstart");
        assert_eq!(json["inState"], "s0");
        assert_eq!(json["outState"], "s1");
        assert_eq!(json["output"], "done");
    }
}
