//! Transaction log records
//!
//! Two kinds of record live in `_transactions/Transactions`:
//!
//! - **start**: `{"id": <txn id>}`, written by `begin`
//! - **commit**: `{"id": <txn id>, "LOG": "%\nrepo|bucket|oid\n...$"}`,
//!   written by `commit`; its durable write is the commit point
//!
//! A commit record is recognised only when its `LOG` payload carries both
//! the start marker and the end marker and every line in between parses.
//! Anything else is treated as a transaction that never reached its commit
//! point.

use lxp_core::{ObjectRef, Oid, Record, Result, TxnId, Value};

/// Label carrying the transaction id
pub const ID_LABEL: &str = "id";

/// Label carrying the serialized update list
pub const LOG_LABEL: &str = "LOG";

/// Opens a commit payload
pub const START_MARKER: &str = "%\n";

/// Closes a commit payload
pub const END_MARKER: &str = "$";

const FIELD_SEPARATOR: char = '|';

/// What a record found in the log bucket means for recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Transaction started but never reached its commit point
    Start(Option<TxnId>),
    /// Transaction is durable; its updates must be swizzled
    Commit {
        /// Id, when the record carries one
        txn_id: Option<TxnId>,
        /// Updated objects, in commit order
        updates: Vec<ObjectRef>,
    },
    /// Unrecognisable payload
    Malformed,
}

/// Build the start record for `txn_id`
pub fn start_record(txn_id: TxnId) -> Result<Record> {
    Record::new().with(ID_LABEL, id_value(txn_id))
}

/// Build the commit record for `txn_id`
pub fn commit_record(txn_id: TxnId, updates: &[ObjectRef]) -> Result<Record> {
    start_record(txn_id)?.with(LOG_LABEL, encode_payload(updates))
}

fn id_value(txn_id: TxnId) -> Value {
    Value::Long(txn_id.as_u64() as i64)
}

/// Serialize an update list
pub fn encode_payload(updates: &[ObjectRef]) -> String {
    let mut payload = String::from(START_MARKER);
    for update in updates {
        payload.push_str(&update.repository);
        payload.push(FIELD_SEPARATOR);
        payload.push_str(&update.bucket);
        payload.push(FIELD_SEPARATOR);
        payload.push_str(&update.oid.to_string());
        payload.push('\n');
    }
    payload.push_str(END_MARKER);
    payload
}

/// Parse an update list; `None` unless both markers and every line are valid
pub fn parse_payload(payload: &str) -> Option<Vec<ObjectRef>> {
    let body = payload.strip_prefix(START_MARKER)?.strip_suffix(END_MARKER)?;
    body.lines()
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<ObjectRef> {
    let mut parts = line.split(FIELD_SEPARATOR);
    let repository = parts.next()?;
    let bucket = parts.next()?;
    let oid: Oid = parts.next()?.parse().ok()?;
    if parts.next().is_some() || repository.is_empty() || bucket.is_empty() {
        return None;
    }
    Some(ObjectRef::new(repository, bucket, oid))
}

/// Classify a record read from the log bucket
pub fn classify(record: &Record) -> LogRecord {
    let txn_id = match record.get(ID_LABEL) {
        Ok(Value::Long(id)) if *id >= 0 => Some(TxnId::new(*id as u64)),
        Ok(Value::Int(id)) if *id >= 0 => Some(TxnId::new(*id as u64)),
        _ => None,
    };

    match record.get(LOG_LABEL) {
        Ok(Value::String(payload)) => match parse_payload(payload) {
            Some(updates) => LogRecord::Commit { txn_id, updates },
            None => LogRecord::Malformed,
        },
        Ok(_) => LogRecord::Malformed,
        Err(_) if txn_id.is_some() => LogRecord::Start(txn_id),
        Err(_) => LogRecord::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(repo: &str, bucket: &str, oid: u64) -> ObjectRef {
        ObjectRef::new(repo, bucket, Oid::new(oid))
    }

    #[test]
    fn test_payload_format() {
        let payload = encode_payload(&[obj("people", "all", 1), obj("people", "all", 2)]);
        assert_eq!(payload, "%\npeople|all|1\npeople|all|2\n$");
        assert_eq!(encode_payload(&[]), "%\n$");
    }

    #[test]
    fn test_commit_record_classifies_as_commit() {
        let updates = vec![obj("a", "b", 7), obj("c", "d", 9)];
        let record = commit_record(TxnId::new(3), &updates).unwrap();
        assert_eq!(
            classify(&record),
            LogRecord::Commit {
                txn_id: Some(TxnId::new(3)),
                updates
            }
        );
    }

    #[test]
    fn test_start_record_classifies_as_start() {
        assert_eq!(
            classify(&start_record(TxnId::new(4)).unwrap()),
            LogRecord::Start(Some(TxnId::new(4)))
        );
    }

    #[test]
    fn test_both_markers_required() {
        assert!(parse_payload("%\na|b|1\n").is_none());
        assert!(parse_payload("a|b|1\n$").is_none());
        assert!(parse_payload("%\na|b\n$").is_none());
        assert!(parse_payload("%\na|b|x\n$").is_none());
        assert!(parse_payload("%\na|b|1|2\n$").is_none());
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let mut record = start_record(TxnId::new(5)).unwrap();
        record.put(LOG_LABEL, "%\npeople|all|1\npeo").unwrap();
        assert_eq!(classify(&record), LogRecord::Malformed);
        assert_eq!(classify(&Record::new()), LogRecord::Malformed);
    }
}
