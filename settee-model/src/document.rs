//! Typed documents and their JSON wire shape.
//!
//! A [`Document`] is one leaf of a revision tree together with as much of
//! its ancestor path as the producer knows. On the wire the same data is a
//! JSON object carrying the reserved `_id`, `_rev`, `_revisions` and
//! `_deleted` fields next to the body; conversion and validation happen
//! here, at the boundary, so the rest of the system only sees well-formed
//! values.

use crate::error::DbError;
use crate::revision::RevId;
use serde_json::Value;

/// The non-reserved fields of a document.
pub type DocBody = serde_json::Map<String, Value>;

const LOCAL_PREFIX: &str = "_local/";

/// True for ids that bypass revision tracking entirely.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

/// One document leaf.
///
/// `path` lists revision hashes leaf-first: `path[0]` is the hash of this
/// revision, `path[1]` its parent, and so on as far back as known. A `None`
/// body is a tombstone. Local documents (`_local/` ids) carry `rev_num == 0`
/// and an empty path; their revision is the fixed `"0-1"` on output.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub rev_num: u64,
    pub path: Vec<String>,
    pub body: Option<DocBody>,
}

impl Document {
    pub fn new<I, S>(id: impl Into<String>, rev_num: u64, path: I, body: DocBody) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            rev_num,
            path: path.into_iter().map(Into::into).collect(),
            body: Some(body),
        }
    }

    /// A tombstone leaf.
    pub fn deleted<I, S>(id: impl Into<String>, rev_num: u64, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            rev_num,
            path: path.into_iter().map(Into::into).collect(),
            body: None,
        }
    }

    /// A local (unversioned) document. A `None` body deletes the entry.
    pub fn local(id: impl Into<String>, body: Option<DocBody>) -> Self {
        Self { id: id.into(), rev_num: 0, path: Vec::new(), body }
    }

    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    pub fn is_deleted(&self) -> bool {
        self.body.is_none()
    }

    /// The leaf revision. Meaningless for local documents (empty path).
    pub fn leaf_rev(&self) -> RevId {
        RevId::new(self.rev_num, self.path[0].clone())
    }

    /// Parse the JSON wire shape.
    ///
    /// Reserved fields are stripped from the body. `_revisions`, when
    /// present, must agree with `_rev` on both the generation and the leaf
    /// hash.
    pub fn from_value(value: Value) -> Result<Self, DbError> {
        let Value::Object(mut map) = value else {
            return Err(DbError::InvalidRevision("document is not a JSON object".into()));
        };
        let id = match map.remove("_id") {
            Some(Value::String(id)) => id,
            _ => return Err(DbError::InvalidRevision("missing _id".into())),
        };
        let deleted = matches!(map.remove("_deleted"), Some(Value::Bool(true)));

        if is_local_id(&id) {
            map.remove("_rev");
            map.remove("_revisions");
            let body = if deleted { None } else { Some(map) };
            return Ok(Document::local(id, body));
        }

        let rev: RevId = match map.remove("_rev") {
            Some(Value::String(s)) => s.parse()?,
            _ => return Err(DbError::InvalidRevision(format!("{id}: missing _rev"))),
        };
        let path = match map.remove("_revisions") {
            Some(revisions) => parse_revisions(revisions, &rev)?,
            None => vec![rev.hash.clone()],
        };
        let body = if deleted { None } else { Some(map) };
        Ok(Document { id, rev_num: rev.num, path, body })
    }

    /// Produce the JSON wire shape. `_revisions` is included only when
    /// `include_path` is requested, and never for local documents.
    pub fn into_value(self, include_path: bool) -> Value {
        let local = self.is_local();
        let deleted = self.is_deleted();
        let rev = if local {
            "0-1".to_string()
        } else {
            format!("{}-{}", self.rev_num, self.path[0])
        };

        let mut map = self.body.unwrap_or_default();
        map.insert("_id".into(), Value::String(self.id));
        map.insert("_rev".into(), Value::String(rev));
        if deleted {
            map.insert("_deleted".into(), Value::Bool(true));
        }
        if include_path && !local {
            map.insert(
                "_revisions".into(),
                serde_json::json!({ "start": self.rev_num, "ids": self.path }),
            );
        }
        Value::Object(map)
    }
}

fn parse_revisions(revisions: Value, rev: &RevId) -> Result<Vec<String>, DbError> {
    let invalid = || DbError::InvalidRevision(format!("invalid _revisions for {rev}"));
    let Value::Object(mut revisions) = revisions else {
        return Err(invalid());
    };
    let start = revisions
        .remove("start")
        .and_then(|v| v.as_u64())
        .ok_or_else(invalid)?;
    let ids = match revisions.remove("ids") {
        Some(Value::Array(ids)) => ids
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(invalid()),
    };
    // _revisions must describe the same leaf as _rev
    if start != rev.num || ids.first() != Some(&rev.hash) {
        return Err(invalid());
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> DocBody {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_wire_roundtrip() {
        let doc = Document::from_value(json!({
            "_id": "test",
            "_rev": "2-b",
            "_revisions": {"start": 2, "ids": ["b", "a"]},
            "hello": "world",
        }))
        .unwrap();
        assert_eq!(doc, Document::new("test", 2, ["b", "a"], obj(json!({"hello": "world"}))));
        assert_eq!(
            doc.into_value(true),
            json!({
                "_id": "test",
                "_rev": "2-b",
                "_revisions": {"start": 2, "ids": ["b", "a"]},
                "hello": "world",
            })
        );
    }

    #[test]
    fn test_rev_defaults_to_single_element_path() {
        let doc = Document::from_value(json!({"_id": "test", "_rev": "1-a", "x": 1})).unwrap();
        assert_eq!(doc.path, vec!["a".to_string()]);
        // the path is omitted from output unless asked for
        assert_eq!(doc.into_value(false), json!({"_id": "test", "_rev": "1-a", "x": 1}));
    }

    #[test]
    fn test_deleted_carries_no_body() {
        let doc = Document::from_value(json!({
            "_id": "test",
            "_rev": "2-b",
            "_deleted": true,
            "leftover": 1,
        }))
        .unwrap();
        assert!(doc.is_deleted());
        assert_eq!(doc.into_value(false), json!({"_id": "test", "_rev": "2-b", "_deleted": true}));
    }

    #[test]
    fn test_mismatched_revisions_rejected() {
        let res = Document::from_value(json!({
            "_id": "test",
            "_rev": "2-b",
            "_revisions": {"start": 2, "ids": ["c", "a"]},
        }));
        assert!(matches!(res, Err(DbError::InvalidRevision(_))));

        let res = Document::from_value(json!({
            "_id": "test",
            "_rev": "3-b",
            "_revisions": {"start": 2, "ids": ["b", "a"]},
        }));
        assert!(matches!(res, Err(DbError::InvalidRevision(_))));
    }

    #[test]
    fn test_local_document_synthetic_rev() {
        let doc = Document::from_value(json!({"_id": "_local/log", "cursor": 7})).unwrap();
        assert!(doc.is_local());
        assert_eq!(doc.rev_num, 0);
        assert_eq!(
            doc.into_value(true),
            json!({"_id": "_local/log", "_rev": "0-1", "cursor": 7})
        );
    }
}
