use serde::Serialize;

use crate::browser::ExtractedRecord;

pub const NO_AVAILABILITY: &str = "No availability";
pub const NAME_FIELD: &str = "name";
pub const AVAILABILITY_FIELD: &str = "availability";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationOption {
    pub name: String,
    pub availability_text: String,
}

impl LocationOption {
    pub fn new(name: impl Into<String>, availability_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            availability_text: availability_text.into(),
        }
    }

    /// Entries rendered without an availability label carry no signal and are
    /// dropped rather than read as open slots.
    pub fn from_record(record: &ExtractedRecord) -> Option<Self> {
        let availability = record.field(AVAILABILITY_FIELD)?.trim();
        let name = record.field(NAME_FIELD).unwrap_or_default().trim();
        Some(Self::new(name, availability))
    }

    pub fn is_available(&self) -> bool {
        self.availability_text != NO_AVAILABILITY
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilityResult {
    pub available: bool,
    pub detail_text: String,
    pub location: Option<String>,
}

/// First entry whose text differs from the sentinel wins; order is as rendered.
pub fn interpret(options: &[LocationOption]) -> AvailabilityResult {
    match options.iter().find(|option| option.is_available()) {
        Some(option) => AvailabilityResult {
            available: true,
            detail_text: option.availability_text.clone(),
            location: Some(option.name.clone()),
        },
        None => AvailabilityResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_open_location_wins() {
        let options = vec![
            LocationOption::new("Galway", "No availability"),
            LocationOption::new("Dublin", "2 slots"),
            LocationOption::new("Cork", "No availability"),
        ];
        let result = interpret(&options);
        assert!(result.available);
        assert_eq!(result.detail_text, "2 slots");
        assert_eq!(result.location.as_deref(), Some("Dublin"));
    }

    #[test]
    fn order_decides_between_open_locations() {
        let options = vec![
            LocationOption::new("Cork", "1 slot"),
            LocationOption::new("Dublin", "9 slots"),
        ];
        assert_eq!(interpret(&options).detail_text, "1 slot");
    }

    #[test]
    fn all_sentinel_or_empty_is_unavailable() {
        assert!(!interpret(&[]).available);
        for len in 1..5 {
            let options = (0..len)
                .map(|i| LocationOption::new(format!("centre-{i}"), NO_AVAILABILITY))
                .collect::<Vec<_>>();
            let result = interpret(&options);
            assert!(!result.available);
            assert!(result.detail_text.is_empty());
        }
    }

    #[test]
    fn record_conversion_trims_and_skips_unlabelled() {
        let labelled = ExtractedRecord::from_pairs([
            (NAME_FIELD, Some("  Carnmore ")),
            (AVAILABILITY_FIELD, Some(" No availability ")),
        ]);
        let option = LocationOption::from_record(&labelled).unwrap();
        assert_eq!(option, LocationOption::new("Carnmore", NO_AVAILABILITY));
        assert!(!option.is_available());

        let unlabelled = ExtractedRecord::from_pairs([
            (NAME_FIELD, Some("Tuam")),
            (AVAILABILITY_FIELD, None),
        ]);
        assert!(LocationOption::from_record(&unlabelled).is_none());
    }
}
