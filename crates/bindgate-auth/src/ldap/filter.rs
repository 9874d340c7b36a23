//! Search filter construction

use bindgate_core::FILTER_PLACEHOLDERS;
use ldap3::ldap_escape;

const CANONICAL_PLACEHOLDER: &str = "{0}";

/// Build user search filter with username substitution
///
/// The username is escaped per RFC 4515 so it can only ever match as a
/// literal value.
pub fn build_search_filter(template: &str, username: &str) -> String {
    // Normalize aliases first so the substituted value is never rescanned
    let template = FILTER_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |filter, placeholder| {
            filter.replace(placeholder, CANONICAL_PLACEHOLDER)
        });

    template.replace(CANONICAL_PLACEHOLDER, &ldap_escape(username))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_filter_building() {
        assert_eq!(build_search_filter("(uid={0})", "joe"), "(uid=joe)");
        assert_eq!(
            build_search_filter("(sAMAccountName={username})", "joe"),
            "(sAMAccountName=joe)"
        );
        assert_eq!(
            build_search_filter("(|(uid={0})(mail={0}))", "joe"),
            "(|(uid=joe)(mail=joe))"
        );
    }

    #[test]
    fn test_filter_metacharacters_are_escaped() {
        assert_eq!(build_search_filter("(uid={0})", "*"), "(uid=\\2a)");
        assert_eq!(
            build_search_filter("(uid={0})", "joe)(uid=*"),
            "(uid=joe\\29\\28uid=\\2a)"
        );
        assert_eq!(build_search_filter("(uid={0})", "a\\b"), "(uid=a\\5cb)");
        assert_eq!(
            build_search_filter("(uid={username})", "{0}"),
            "(uid={0})"
        );
    }
}
