//! Partial-write patches.
//!
//! Adapters write only the fields that are `Some`; everything else is left
//! as stored. This keeps link-only writes from touching contact data.

use crate::birthday::Birthday;
use crate::stage::PipelineStage;
use serde::{Deserialize, Serialize};

/// A partial set of device-contact fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFields {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Full replacement list of phone numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phones: Option<Vec<String>>,
    /// Full replacement list of email addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<String>>,
    /// Job title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    /// Company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Birthday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<Birthday>,
    /// Free-text note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DeviceFields {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phones.is_none()
            && self.emails.is_none()
            && self.job_title.is_none()
            && self.company.is_none()
            && self.birthday.is_none()
            && self.note.is_none()
    }

    /// Names of the fields that are set, for logging.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.name.is_some() {
            names.push("name");
        }
        if self.phones.is_some() {
            names.push("phones");
        }
        if self.emails.is_some() {
            names.push("emails");
        }
        if self.job_title.is_some() {
            names.push("job_title");
        }
        if self.company.is_some() {
            names.push("company");
        }
        if self.birthday.is_some() {
            names.push("birthday");
        }
        if self.note.is_some() {
            names.push("note");
        }
        names
    }
}

/// A partial set of remote-contact fields.
///
/// Serializes with absent fields omitted so it can be sent as a patch body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteFields {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Job description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    /// Birthday as an ISO date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Pipeline stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_stage: Option<PipelineStage>,
    /// Device link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_contact_id: Option<String>,
}

impl RemoteFields {
    /// A patch that only sets the device link.
    pub fn link(device_id: impl Into<String>) -> Self {
        Self {
            device_contact_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns true if the device link is the only field set.
    pub fn is_link_only(&self) -> bool {
        self.device_contact_id.is_some()
            && Self {
                device_contact_id: None,
                ..self.clone()
            }
            .is_empty()
    }
}
