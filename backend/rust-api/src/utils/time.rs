use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Serde adapter storing `Option<DateTime<Utc>>` as a BSON datetime.
///
/// The driver's `chrono_datetime_as_bson_datetime` helper only covers the
/// non-optional case; end timestamps are unset until an attempt finalizes.
pub mod opt_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson::DateTime as BsonDateTime;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => BsonDateTime::from_millis(dt.timestamp_millis()).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<BsonDateTime>::deserialize(deserializer)?;
        Ok(value.map(|dt| dt.to_chrono()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn chrono_roundtrip_preserves_millis() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let bson = chrono_to_bson(dt);
        assert_eq!(bson.timestamp_millis(), dt.timestamp_millis());
        assert_eq!(bson.to_chrono(), dt);
    }
}
