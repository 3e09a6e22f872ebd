//! Device and remote contact records.

use crate::birthday::Birthday;
use crate::fields::{DeviceFields, RemoteFields};
use crate::normalize::{normalize_email, normalize_phone};
use crate::stage::PipelineStage;
use serde::{Deserialize, Serialize};

/// A record in the device address book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceContact {
    /// Opaque device identifier, present once the record exists on-device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Phone numbers, primary first.
    #[serde(default)]
    pub phones: Vec<String>,
    /// Email addresses, primary first.
    #[serde(default)]
    pub emails: Vec<String>,
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

impl DeviceContact {
    /// Creates a contact with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a stored record from an id and a field set.
    pub fn from_fields(id: impl Into<String>, fields: &DeviceFields) -> Self {
        let mut contact = Self {
            id: Some(id.into()),
            ..Self::default()
        };
        contact.apply(fields);
        contact
    }

    /// Sets the device identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds a phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phones.push(phone.into());
        self
    }

    /// Adds an email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.emails.push(email.into());
        self
    }

    /// Sets the job title.
    pub fn with_job_title(mut self, title: impl Into<String>) -> Self {
        self.job_title = Some(title.into());
        self
    }

    /// Sets the company.
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Sets the birthday.
    pub fn with_birthday(mut self, birthday: Birthday) -> Self {
        self.birthday = Some(birthday);
        self
    }

    /// Sets the note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The device identifier, if present and non-empty.
    pub fn device_id(&self) -> Option<&str> {
        non_empty(self.id.as_deref())
    }

    /// First non-empty phone number.
    pub fn primary_phone(&self) -> Option<&str> {
        self.phones.iter().find_map(|p| non_empty(Some(p.as_str())))
    }

    /// First non-empty email address.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.iter().find_map(|e| non_empty(Some(e.as_str())))
    }

    /// Job description: the title, or the company when there is no title.
    pub fn job(&self) -> Option<&str> {
        non_empty(self.job_title.as_deref()).or_else(|| non_empty(self.company.as_deref()))
    }

    /// Fields for a new remote record imported from this contact.
    pub fn to_remote_fields(&self, stage: PipelineStage) -> RemoteFields {
        RemoteFields {
            name: Some(self.name.trim().to_string()),
            phone: self.primary_phone().map(str::to_string),
            email: self.primary_email().map(str::to_string),
            job: self.job().map(str::to_string),
            birthday: self.birthday.map(|b| b.to_iso()),
            notes: non_empty(self.note.as_deref()).map(str::to_string),
            pipeline_stage: Some(stage),
            device_contact_id: self.device_id().map(str::to_string),
        }
    }

    /// Writes the supplied fields onto this record.
    pub fn apply(&mut self, fields: &DeviceFields) {
        if let Some(name) = &fields.name {
            self.name = name.clone();
        }
        if let Some(phones) = &fields.phones {
            self.phones = phones.clone();
        }
        if let Some(emails) = &fields.emails {
            self.emails = emails.clone();
        }
        if let Some(title) = &fields.job_title {
            self.job_title = Some(title.clone());
        }
        if let Some(company) = &fields.company {
            self.company = Some(company.clone());
        }
        if let Some(birthday) = fields.birthday {
            self.birthday = Some(birthday);
        }
        if let Some(note) = &fields.note {
            self.note = Some(note.clone());
        }
    }
}

/// A record in the CRM store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteContact {
    /// Store-assigned identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
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
    /// Outreach tier.
    #[serde(default)]
    pub pipeline_stage: PipelineStage,
    /// Device identifier of the corresponding device contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_contact_id: Option<String>,
}

impl RemoteContact {
    /// Creates a record with an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a stored record from an id and a field set.
    pub fn from_fields(id: impl Into<String>, fields: &RemoteFields) -> Self {
        let mut contact = Self {
            id: id.into(),
            ..Self::default()
        };
        contact.apply(fields);
        contact
    }

    /// Sets the phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Sets the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the job description.
    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Sets the ISO birthday.
    pub fn with_birthday(mut self, birthday: impl Into<String>) -> Self {
        self.birthday = Some(birthday.into());
        self
    }

    /// Sets the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Sets the pipeline stage.
    pub fn with_stage(mut self, stage: PipelineStage) -> Self {
        self.pipeline_stage = stage;
        self
    }

    /// Sets the device link.
    pub fn with_device_link(mut self, device_id: impl Into<String>) -> Self {
        self.device_contact_id = Some(device_id.into());
        self
    }

    /// The device link, if present and non-empty.
    pub fn device_link(&self) -> Option<&str> {
        non_empty(self.device_contact_id.as_deref())
    }

    /// Returns true if a non-empty device link is stored.
    pub fn is_linked(&self) -> bool {
        self.device_link().is_some()
    }

    /// Fields for a new device record created from this contact.
    ///
    /// An unparseable birthday is dropped rather than failing the create.
    pub fn to_device_fields(&self) -> DeviceFields {
        DeviceFields {
            name: Some(self.name.trim().to_string()),
            phones: non_empty(self.phone.as_deref()).map(|p| vec![p.to_string()]),
            emails: non_empty(self.email.as_deref()).map(|e| vec![e.to_string()]),
            job_title: non_empty(self.job.as_deref()).map(str::to_string),
            company: None,
            birthday: self.parsed_birthday(),
            note: non_empty(self.notes.as_deref()).map(str::to_string),
        }
    }

    /// The birthday parsed into parts, if present and valid.
    pub fn parsed_birthday(&self) -> Option<Birthday> {
        non_empty(self.birthday.as_deref()).and_then(|b| Birthday::parse_iso(b).ok())
    }

    /// Computes the patch that pushes this record's values onto `device`.
    ///
    /// A remote value overwrites the device value only when it is non-empty
    /// and differs. Phones and emails compare by normalized key; a differing
    /// remote value replaces the device's primary entry and keeps the rest.
    pub fn overwrite_patch(&self, device: &DeviceContact) -> DeviceFields {
        let mut patch = DeviceFields::default();

        if let Some(name) = non_empty(Some(self.name.as_str())) {
            if name != device.name.trim() {
                patch.name = Some(name.to_string());
            }
        }

        if let Some(phone) = non_empty(self.phone.as_deref()) {
            let key = normalize_phone(phone);
            let present = device.phones.iter().any(|p| match &key {
                Some(key) => normalize_phone(p).as_ref() == Some(key),
                None => p.trim() == phone,
            });
            if !present {
                patch.phones = Some(replace_primary(&device.phones, phone));
            }
        }

        if let Some(email) = non_empty(self.email.as_deref()) {
            let key = normalize_email(email);
            let present = device
                .emails
                .iter()
                .any(|e| normalize_email(e).is_some() && normalize_email(e) == key);
            if !present {
                patch.emails = Some(replace_primary(&device.emails, email));
            }
        }

        if let Some(job) = non_empty(self.job.as_deref()) {
            if device.job() != Some(job) {
                patch.job_title = Some(job.to_string());
            }
        }

        if let Some(birthday) = self.parsed_birthday() {
            if device.birthday != Some(birthday) {
                patch.birthday = Some(birthday);
            }
        }

        if let Some(notes) = non_empty(self.notes.as_deref()) {
            if non_empty(device.note.as_deref()) != Some(notes) {
                patch.note = Some(notes.to_string());
            }
        }

        patch
    }

    /// Writes the supplied fields onto this record.
    pub fn apply(&mut self, fields: &RemoteFields) {
        if let Some(name) = &fields.name {
            self.name = name.clone();
        }
        if let Some(phone) = &fields.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(email) = &fields.email {
            self.email = Some(email.clone());
        }
        if let Some(job) = &fields.job {
            self.job = Some(job.clone());
        }
        if let Some(birthday) = &fields.birthday {
            self.birthday = Some(birthday.clone());
        }
        if let Some(notes) = &fields.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(stage) = &fields.pipeline_stage {
            self.pipeline_stage = stage.clone();
        }
        if let Some(link) = &fields.device_contact_id {
            self.device_contact_id = Some(link.clone());
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn replace_primary(existing: &[String], primary: &str) -> Vec<String> {
    let mut values = Vec::with_capacity(existing.len().max(1));
    values.push(primary.to_string());
    values.extend(existing.iter().skip(1).cloned());
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> DeviceContact {
        DeviceContact::new("Ana Silva")
            .with_id("dev-1")
            .with_phone("+1 555 000 1111")
            .with_email("ana@example.com")
            .with_company("Acme")
            .with_birthday(Birthday::new(Some(1991), 4, 12).unwrap())
    }

    #[test]
    fn import_fields_from_device() {
        let fields = ana().to_remote_fields(PipelineStage::New);
        assert_eq!(fields.name.as_deref(), Some("Ana Silva"));
        assert_eq!(fields.phone.as_deref(), Some("+1 555 000 1111"));
        assert_eq!(fields.job.as_deref(), Some("Acme"));
        assert_eq!(fields.birthday.as_deref(), Some("1991-04-12"));
        assert_eq!(fields.notes, None);
        assert_eq!(fields.pipeline_stage, Some(PipelineStage::New));
        assert_eq!(fields.device_contact_id.as_deref(), Some("dev-1"));
    }

    #[test]
    fn blank_link_is_not_a_link() {
        let remote = RemoteContact::new("r1", "Ben Lee").with_device_link("  ");
        assert!(!remote.is_linked());
        assert!(remote.with_device_link("dev-9").is_linked());
    }

    #[test]
    fn imported_record_needs_no_push() {
        let device = ana();
        let remote = RemoteContact::from_fields("r1", &device.to_remote_fields(PipelineStage::New));
        assert!(remote.overwrite_patch(&device).is_empty());
    }

    #[test]
    fn empty_remote_values_leave_device_untouched() {
        let device = ana().with_note("likes jazz");
        let remote = RemoteContact::new("r1", "Ana Silva");
        assert!(remote.overwrite_patch(&device).is_empty());
    }

    #[test]
    fn differing_values_overwrite() {
        let device = ana().with_phone("555 999 8888");
        let remote = RemoteContact::new("r1", "Ana Silva-Costa")
            .with_phone("(555) 222-3333")
            .with_email("ANA@example.com")
            .with_notes("moved to Lisbon")
            .with_birthday("1991-04-13");

        let patch = remote.overwrite_patch(&device);
        assert_eq!(patch.name.as_deref(), Some("Ana Silva-Costa"));
        assert_eq!(
            patch.phones,
            Some(vec!["(555) 222-3333".to_string(), "555 999 8888".to_string()])
        );
        assert_eq!(patch.emails, None);
        assert_eq!(patch.note.as_deref(), Some("moved to Lisbon"));
        assert_eq!(patch.birthday, Birthday::new(Some(1991), 4, 13).ok());
    }

    #[test]
    fn secondary_phone_counts_as_present() {
        let device = ana().with_phone("555-444-3210");
        let remote = RemoteContact::new("r1", "Ana Silva").with_phone("5554443210");
        assert!(remote.overwrite_patch(&device).phones.is_none());
    }

    #[test]
    fn device_fields_from_remote() {
        let remote = RemoteContact::new("r1", "Ben Lee")
            .with_email("ben@x.com")
            .with_job("Architect")
            .with_birthday("not a date");
        let fields = remote.to_device_fields();
        assert_eq!(fields.emails, Some(vec!["ben@x.com".to_string()]));
        assert_eq!(fields.phones, None);
        assert_eq!(fields.job_title.as_deref(), Some("Architect"));
        assert_eq!(fields.birthday, None);

        let device = DeviceContact::from_fields("dev-2", &fields);
        assert_eq!(device.device_id(), Some("dev-2"));
        assert_eq!(device.name, "Ben Lee");
    }

    #[test]
    fn remote_json_ignores_unknown_keys() {
        let json = r#"{
            "id": "64f0c0ffee",
            "name": "Ben Lee",
            "email": "ben@x.com",
            "phone": null,
            "pipeline_stage": "Monthly",
            "target_interval_days": 30,
            "tags": []
        }"#;
        let remote: RemoteContact = serde_json::from_str(json).unwrap();
        assert_eq!(remote.id, "64f0c0ffee");
        assert_eq!(remote.phone, None);
        assert_eq!(remote.pipeline_stage, PipelineStage::Monthly);
        assert!(!remote.is_linked());
    }
}
