use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Wraps passenger contact data (phone numbers, email addresses) so that it never
/// shows up in full in `tracing` output.
///
/// `Debug` and `Display` print a masked form; serialization keeps the real value
/// because API responses and outbound SMS/email need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    /// Masked rendering: emails keep their domain, everything else keeps the
    /// last three characters.
    pub fn redacted(&self) -> String {
        let raw = self.0.as_ref();
        if let Some((local, domain)) = raw.split_once('@') {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            return format!("{}***@{}", first, domain);
        }

        let count = raw.chars().count();
        if count <= 3 {
            return "*".repeat(count);
        }
        let tail: String = raw.chars().skip(count - 3).collect();
        format!("{}{}", "*".repeat(count - 3), tail)
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
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
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_keeps_last_three_digits() {
        let phone = Masked("0241234567".to_string());
        assert_eq!(format!("{}", phone), "*******567");
    }

    #[test]
    fn email_keeps_domain() {
        let email = Masked("ama@example.com".to_string());
        assert_eq!(format!("{:?}", email), "a***@example.com");
    }

    #[test]
    fn serialization_is_not_masked() {
        let phone = Masked("0241234567".to_string());
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"0241234567\"");
    }
}
