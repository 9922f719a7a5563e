//! Risk classification of access artifacts.
//!
//! The level is a pure function of the scope set and the consent kind.
//! Adding a scope never lowers the level.

use crate::types::{ConsentKind, RiskLevel};

/// Category of a privileged scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeKind {
    FullControl,
    DirectoryWrite,
    MailSend,
}

const FULL_CONTROL: &[&str] = &[
    "directory.accessasuser.all",
    "directory.readwrite.all",
    "rolemanagement.readwrite.directory",
    "application.readwrite.all",
    "approleassignment.readwrite.all",
    "sites.fullcontrol.all",
    "full_access_as_user",
    "full_access_as_app",
    "ews.accessasuser.all",
    "user_impersonation",
];

const DIRECTORY_WRITE: &[&str] = &[
    "user.readwrite.all",
    "group.readwrite.all",
    "groupmember.readwrite.all",
    "domain.readwrite.all",
    "delegatedpermissiongrant.readwrite.all",
    "device.readwrite.all",
    "user.managecreds.all",
];

const MAIL_SEND: &[&str] = &["mail.send", "mail.send.shared", "smtp.send"];

/// Profile and basic-read scopes. A grant holding only these is low risk.
const PROFILE_READ: &[&str] = &[
    "openid",
    "profile",
    "email",
    "offline_access",
    "user.read",
    "user.readbasic.all",
];

/// Classifies one scope as privileged, if it is.
#[must_use]
pub fn privilege_of(scope: &str) -> Option<PrivilegeKind> {
    let s = scope.to_ascii_lowercase();
    if FULL_CONTROL.contains(&s.as_str()) {
        Some(PrivilegeKind::FullControl)
    } else if DIRECTORY_WRITE.contains(&s.as_str()) || s.starts_with("policy.readwrite.") {
        Some(PrivilegeKind::DirectoryWrite)
    } else if MAIL_SEND.contains(&s.as_str()) {
        Some(PrivilegeKind::MailSend)
    } else {
        None
    }
}

fn is_profile_read(scope: &str) -> bool {
    PROFILE_READ.contains(&scope.to_ascii_lowercase().as_str())
}

/// A non-privileged scope that writes user data, e.g. `Files.ReadWrite`.
fn is_data_write(scope: &str) -> bool {
    privilege_of(scope).is_none() && scope.to_ascii_lowercase().contains(".readwrite")
}

/// Scopes from `scopes` that are privileged, in input order.
#[must_use]
pub fn privileged_scopes(scopes: &[String]) -> Vec<&str> {
    scopes
        .iter()
        .map(String::as_str)
        .filter(|s| privilege_of(s).is_some())
        .collect()
}

/// Minimum level for a consent kind; also the level of an empty scope set.
fn floor_for(consent: ConsentKind) -> RiskLevel {
    match consent {
        ConsentKind::RoleAssignment | ConsentKind::SignIn => RiskLevel::Medium,
        ConsentKind::Device | ConsentKind::Principal | ConsentKind::AllPrincipals => {
            RiskLevel::Low
        }
    }
}

/// Classifies an artifact by its scopes and consent kind.
#[must_use]
pub fn classify(scopes: &[String], consent: ConsentKind) -> RiskLevel {
    let level = classify_scopes(scopes).max(floor_for(consent));

    if consent == ConsentKind::AllPrincipals && level == RiskLevel::Low {
        RiskLevel::Medium
    } else {
        level
    }
}

fn classify_scopes(scopes: &[String]) -> RiskLevel {
    let privileged = privileged_scopes(scopes).len();
    let sends_mail = scopes
        .iter()
        .any(|s| privilege_of(s) == Some(PrivilegeKind::MailSend));
    let writes_data = scopes.iter().any(|s| is_data_write(s));

    if privileged >= 2 || (sends_mail && writes_data) {
        RiskLevel::Critical
    } else if privileged == 1 {
        RiskLevel::High
    } else if scopes.iter().all(|s| is_profile_read(s)) {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_classification_table() {
        let cases: &[(&[&str], ConsentKind, RiskLevel)] = &[
            (&["openid", "profile", "User.Read"], ConsentKind::Principal, RiskLevel::Low),
            (&["offline_access", "email"], ConsentKind::Principal, RiskLevel::Low),
            (&["Files.Read"], ConsentKind::Principal, RiskLevel::Medium),
            (&["Mail.Read", "openid"], ConsentKind::Principal, RiskLevel::Medium),
            (&["Files.ReadWrite"], ConsentKind::Principal, RiskLevel::Medium),
            (&["Mail.Send"], ConsentKind::Principal, RiskLevel::High),
            (&["Directory.ReadWrite.All"], ConsentKind::Principal, RiskLevel::High),
            (&["Policy.ReadWrite.ConditionalAccess"], ConsentKind::Principal, RiskLevel::High),
            (&["Mail.Send", "Files.ReadWrite.All"], ConsentKind::Principal, RiskLevel::Critical),
            (
                &["Directory.ReadWrite.All", "User.ReadWrite.All"],
                ConsentKind::Principal,
                RiskLevel::Critical,
            ),
            (&["Payroll.Admin"], ConsentKind::RoleAssignment, RiskLevel::Medium),
            (&[], ConsentKind::RoleAssignment, RiskLevel::Medium),
            (&["openid"], ConsentKind::RoleAssignment, RiskLevel::Medium),
            (&[], ConsentKind::SignIn, RiskLevel::Medium),
            (&[], ConsentKind::Device, RiskLevel::Low),
            (&[], ConsentKind::Principal, RiskLevel::Low),
            (&[], ConsentKind::AllPrincipals, RiskLevel::Medium),
            (&["User.Read"], ConsentKind::AllPrincipals, RiskLevel::Medium),
            (&["Mail.Send"], ConsentKind::AllPrincipals, RiskLevel::High),
        ];

        for (list, consent, expected) in cases {
            assert_eq!(
                classify(&scopes(list), *consent),
                *expected,
                "scopes {list:?} with {consent:?}"
            );
        }
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            classify(&scopes(&["mail.send"]), ConsentKind::Principal),
            RiskLevel::High
        );
        assert_eq!(privilege_of("DIRECTORY.READWRITE.ALL"), Some(PrivilegeKind::FullControl));
    }

    #[test]
    fn test_adding_a_scope_never_lowers_risk() {
        let pool = [
            "openid",
            "User.Read",
            "Files.Read",
            "Files.ReadWrite",
            "Mail.Send",
            "Directory.ReadWrite.All",
            "Group.ReadWrite.All",
            "Calendars.Read",
        ];
        let consents = [
            ConsentKind::Principal,
            ConsentKind::AllPrincipals,
            ConsentKind::RoleAssignment,
        ];

        // Every subset of the pool against every single-scope extension.
        for mask in 0u32..(1 << pool.len()) {
            let base: Vec<String> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| (*s).to_string())
                .collect();
            for extra in pool {
                if base.iter().any(|s| s == extra) {
                    continue;
                }
                let mut extended = base.clone();
                extended.push(extra.to_string());
                for consent in consents {
                    assert!(
                        classify(&extended, consent) >= classify(&base, consent),
                        "adding {extra} to {base:?} lowered risk under {consent:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_admin_consent_never_lowers_risk() {
        for list in [&["openid"][..], &["Files.Read"], &["Mail.Send"], &[]] {
            let s = scopes(list);
            assert!(
                classify(&s, ConsentKind::AllPrincipals) >= classify(&s, ConsentKind::Principal)
            );
        }
    }

    #[test]
    fn test_privileged_scopes_keeps_order() {
        let s = scopes(&["openid", "User.ReadWrite.All", "Files.Read", "Mail.Send"]);
        assert_eq!(privileged_scopes(&s), vec!["User.ReadWrite.All", "Mail.Send"]);
    }
}
