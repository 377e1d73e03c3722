#![forbid(unsafe_code)]

use crate::proxy::{CallError, ServerProxy};
use crate::xmlrpc::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Stored minutiae keyed by finger slot (`"1"` to `"10"`).
pub type Fingerprints = BTreeMap<String, Vec<u8>>;

/// A student as returned by `get_student_fingerprints`.
///
/// The server answers an unknown student id with an empty struct, which
/// decodes to an empty record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentRecord {
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub img_name: Option<String>,
    /// Passport photograph.
    pub img: Option<Vec<u8>>,
    pub fingerprints: Fingerprints,
}

impl StudentRecord {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, CallError> {
        let members = value
            .as_struct()
            .ok_or_else(|| CallError::Malformed("student record is not a struct".into()))?;

        let text = |key: &str| -> Result<Option<String>, CallError> {
            match members.get(key) {
                None | Some(Value::Nil) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(CallError::Malformed(format!(
                    "{key} is not a string: {other:?}"
                ))),
            }
        };

        let img = match members.get("img") {
            None | Some(Value::Nil) => None,
            Some(Value::Base64(bytes)) => Some(bytes.clone()),
            Some(_) => return Err(CallError::Malformed("img is not binary".into())),
        };

        let mut fingerprints = Fingerprints::new();
        if let Some(slots) = members.get("fingerprints") {
            let slots = slots
                .as_struct()
                .ok_or_else(|| CallError::Malformed("fingerprints is not a struct".into()))?;
            for (slot, data) in slots {
                let bytes = data.as_bytes().ok_or_else(|| {
                    CallError::Malformed(format!("fingerprint {slot} is not binary"))
                })?;
                fingerprints.insert(slot.clone(), bytes.to_vec());
            }
        }

        Ok(Self {
            email: text("email")?,
            firstname: text("firstname")?,
            lastname: text("lastname")?,
            img_name: text("img_name")?,
            img,
            fingerprints,
        })
    }
}

/// The record server operations this client consumes.
#[async_trait]
pub trait RecordService: Send + Sync {
    /// Store `fingerprints` for `student_id`. The server answers `false`
    /// when there was nothing to store.
    async fn put_student_fingerprints(
        &self,
        student_id: &str,
        fingerprints: Fingerprints,
    ) -> Result<bool, CallError>;

    async fn get_student_fingerprints(&self, student_id: &str)
    -> Result<StudentRecord, CallError>;

    /// Liveness check; a healthy server echoes `["pong", value]`.
    async fn ping(&self, value: i64) -> Result<Value, CallError>;
}

#[async_trait]
impl RecordService for ServerProxy {
    async fn put_student_fingerprints(
        &self,
        student_id: &str,
        fingerprints: Fingerprints,
    ) -> Result<bool, CallError> {
        let slots = fingerprints
            .into_iter()
            .map(|(slot, data)| (slot, Value::Base64(data)))
            .collect::<BTreeMap<_, _>>();
        let result = self
            .call(
                "put_student_fingerprints",
                &[Value::from(student_id), Value::Struct(slots)],
            )
            .await?;
        result
            .as_bool()
            .ok_or_else(|| CallError::Malformed(format!("expected a boolean, got {result:?}")))
    }

    async fn get_student_fingerprints(
        &self,
        student_id: &str,
    ) -> Result<StudentRecord, CallError> {
        let result = self
            .call("get_student_fingerprints", &[Value::from(student_id)])
            .await?;
        StudentRecord::from_value(&result)
    }

    async fn ping(&self, value: i64) -> Result<Value, CallError> {
        self.call("ping", &[Value::Int(value)]).await
    }
}
