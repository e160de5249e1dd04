use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps traveler document data so it never shows up in `Debug`/`Display` output.
///
/// Serialization still emits the real value because the distribution API needs it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_value() {
        let passport = Masked::new("Z1234567".to_string());
        assert_eq!(format!("{:?}", passport), "********");
        assert_eq!(passport.to_string(), "********");
    }

    #[test]
    fn test_serialize_keeps_value() {
        let passport = Masked::new("Z1234567".to_string());
        let json = serde_json::to_string(&passport).unwrap();
        assert_eq!(json, "\"Z1234567\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expose(), "Z1234567");
    }
}
