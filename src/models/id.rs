use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Prefix shared by every id in a workspace.
pub const ID_PREFIX: &str = "ca";

const EPIC_SHAPE: &str = "an epic id like ca-1-a3f";
const TASK_SHAPE: &str = "a task id like ca-1-a3f.2";

/// Identifier of an epic: `ca-<seq>-<suffix>`.
///
/// `seq` is sequential per workspace; the short random suffix keeps ids
/// from different workspaces apart when they are pasted around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EpicId {
    seq: u32,
    suffix: String,
}

impl EpicId {
    pub fn new(seq: u32, suffix: impl Into<String>) -> Self {
        Self {
            seq,
            suffix: suffix.into(),
        }
    }

    /// Allocate a fresh id for the given sequence number.
    pub fn generate(seq: u32) -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..3].to_string();
        Self::new(seq, suffix)
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Id of the `seq`-th task of this epic.
    pub fn task(&self, seq: u32) -> TaskId {
        TaskId {
            epic: self.clone(),
            seq,
        }
    }
}

impl fmt::Display for EpicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", ID_PREFIX, self.seq, self.suffix)
    }
}

impl FromStr for EpicId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidId {
            id: s.to_string(),
            expected: EPIC_SHAPE,
        };
        let rest = s
            .strip_prefix(ID_PREFIX)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(invalid)?;
        let (seq, suffix) = rest.split_once('-').ok_or_else(invalid)?;
        if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let valid_suffix = !suffix.is_empty()
            && suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase());
        if !valid_suffix {
            return Err(invalid());
        }
        let seq = seq.parse().map_err(|_| invalid())?;
        Ok(Self::new(seq, suffix))
    }
}

impl TryFrom<String> for EpicId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EpicId> for String {
    fn from(id: EpicId) -> Self {
        id.to_string()
    }
}

/// Identifier of a task: `<epic id>.<seq>`, so ownership is part of the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    epic: EpicId,
    seq: u32,
}

impl TaskId {
    pub fn epic(&self) -> &EpicId {
        &self.epic
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epic, self.seq)
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidId {
            id: s.to_string(),
            expected: TASK_SHAPE,
        };
        let (epic, seq) = s.rsplit_once('.').ok_or_else(invalid)?;
        let epic: EpicId = epic.parse().map_err(|_| invalid())?;
        if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let seq = seq.parse().map_err(|_| invalid())?;
        Ok(epic.task(seq))
    }
}

impl TryFrom<String> for TaskId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

/// Parse a list of task ids, failing on the first malformed one.
pub fn parse_task_ids<S: AsRef<str>>(raw: &[S]) -> Result<Vec<TaskId>> {
    raw.iter().map(|s| s.as_ref().trim().parse()).collect()
}

/// Either kind of id, for commands that accept both (`cat`, `show`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityId {
    Epic(EpicId),
    Task(TaskId),
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains('.') {
            s.parse().map(Self::Task)
        } else {
            s.parse().map(Self::Epic)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epic(id) => id.fmt(f),
            Self::Task(id) => id.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epic_ids() {
        let id: EpicId = "ca-12-a3f".parse().unwrap();
        assert_eq!(id.seq(), 12);
        assert_eq!(id.to_string(), "ca-12-a3f");
    }

    #[test]
    fn rejects_malformed_epic_ids() {
        for bad in ["", "ca-", "ca-1", "ca-x-abc", "ca-1-", "xx-1-abc", "ca-1-ABC", "ca-1-abc.2"] {
            let err = bad.parse::<EpicId>().unwrap_err();
            assert!(matches!(err, Error::InvalidId { .. }), "{bad} parsed");
        }
    }

    #[test]
    fn parses_task_ids_with_owner() {
        let id: TaskId = "ca-3-0b1.7".parse().unwrap();
        assert_eq!(id.epic().to_string(), "ca-3-0b1");
        assert_eq!(id.seq(), 7);
        assert_eq!(id.to_string(), "ca-3-0b1.7");
    }

    #[test]
    fn rejects_malformed_task_ids() {
        for bad in ["ca-3-0b1", "ca-3-0b1.", "ca-3-0b1.x", "ca-3.1", "task.1"] {
            let err = bad.parse::<TaskId>().unwrap_err();
            assert!(matches!(err, Error::InvalidId { .. }), "{bad} parsed");
        }
    }

    #[test]
    fn orders_by_sequence_numbers() {
        let a: TaskId = "ca-2-aaa.10".parse().unwrap();
        let b: TaskId = "ca-2-aaa.9".parse().unwrap();
        let c: TaskId = "ca-10-aaa.1".parse().unwrap();
        let mut ids = vec![c.clone(), a.clone(), b.clone()];
        ids.sort();
        assert_eq!(ids, vec![b, a, c]);
    }

    #[test]
    fn generated_suffix_is_three_hex_chars() {
        let id = EpicId::generate(4);
        let text = id.to_string();
        assert!(text.starts_with("ca-4-"));
        assert_eq!(text.len(), "ca-4-".len() + 3);
        assert_eq!(text.parse::<EpicId>().unwrap(), id);
    }

    #[test]
    fn entity_id_dispatches_on_shape() {
        assert!(matches!("ca-1-abc".parse::<EntityId>(), Ok(EntityId::Epic(_))));
        assert!(matches!("ca-1-abc.1".parse::<EntityId>(), Ok(EntityId::Task(_))));
    }

    #[test]
    fn serializes_as_plain_strings() {
        let id: TaskId = "ca-1-abc.2".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ca-1-abc.2\"");
        let back: TaskId = serde_json::from_str("\"ca-1-abc.2\"").unwrap();
        assert_eq!(back, id);
    }
}
