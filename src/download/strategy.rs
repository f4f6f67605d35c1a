//! Client-profile fallback
//!
//! Some upstream hosts refuse a request based on who they think is asking.
//! [`try_profiles`] repeats the whole operation with each configured
//! [`ClientProfile`] in order until one is accepted. Only refusals move on
//! to the next profile; any other failure ends the scan at once. There is
//! no delay between attempts and no profile is tried twice.

use std::fmt::Display;
use std::future::Future;

use thiserror::Error;
use tracing::{info, warn};

use super::profiles::ClientProfile;

/// Classifies a failure as an identity-based refusal
pub trait IsRejection {
    /// True when another client identity might get a different answer
    fn is_rejection(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no client profiles configured")]
pub struct NoProfiles;

/// Run `attempt` once per profile, in order, until it succeeds or fails
/// with something other than a rejection.
///
/// When every profile is rejected the last rejection is returned.
pub async fn try_profiles<'p, T, E, F, Fut>(
    profiles: &'p [ClientProfile],
    mut attempt: F,
) -> Result<T, E>
where
    F: FnMut(&'p ClientProfile) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRejection + Display + From<NoProfiles>,
{
    let mut last_error = None;

    for (index, profile) in profiles.iter().enumerate() {
        match attempt(profile).await {
            Ok(value) => {
                if index > 0 {
                    info!(profile = %profile.name, attempts = index + 1, "Accepted after profile fallback");
                }
                return Ok(value);
            }
            Err(error) if error.is_rejection() => {
                warn!(profile = %profile.name, %error, "Client profile rejected, trying next");
                last_error = Some(error);
            }
            Err(error) => {
                warn!(profile = %profile.name, %error, "Attempt failed with non-rejection error");
                return Err(error);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| NoProfiles.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Rejected(&'static str),
        Broken(&'static str),
        Empty,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Rejected(who) => write!(f, "{who}: Sign in to confirm you're not a bot"),
                TestError::Broken(who) => write!(f, "{who}: Unsupported URL"),
                TestError::Empty => write!(f, "no profiles"),
            }
        }
    }

    impl IsRejection for TestError {
        fn is_rejection(&self) -> bool {
            matches!(self, TestError::Rejected(_))
        }
    }

    impl From<NoProfiles> for TestError {
        fn from(_: NoProfiles) -> Self {
            TestError::Empty
        }
    }

    fn profiles(names: &[&str]) -> Vec<ClientProfile> {
        names
            .iter()
            .map(|name| ClientProfile {
                name: name.to_string(),
                http_headers: BTreeMap::new(),
                extractor_args: BTreeMap::new(),
            })
            .collect()
    }

    fn name_of(profile: &ClientProfile) -> &'static str {
        match profile.name.as_str() {
            "A" => "A",
            "B" => "B",
            "C" => "C",
            _ => "?",
        }
    }

    #[tokio::test]
    async fn test_falls_through_rejections_in_order() {
        let profiles = profiles(&["A", "B", "C"]);
        let calls = Mutex::new(Vec::new());

        let result = try_profiles(&profiles, |profile| {
            calls.lock().unwrap().push(profile.name.clone());
            let name = name_of(profile);
            async move {
                match name {
                    "C" => Ok("from C"),
                    other => Err(TestError::Rejected(other)),
                }
            }
        })
        .await;

        assert_eq!(result, Ok("from C"));
        assert_eq!(*calls.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_non_rejection_stops_the_scan() {
        let profiles = profiles(&["A", "B"]);
        let calls = Mutex::new(Vec::new());

        let result: Result<(), _> = try_profiles(&profiles, |profile| {
            calls.lock().unwrap().push(profile.name.clone());
            let name = name_of(profile);
            async move { Err(TestError::Broken(name)) }
        })
        .await;

        assert_eq!(result, Err(TestError::Broken("A")));
        assert_eq!(*calls.lock().unwrap(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_all_rejected_returns_last_error() {
        let profiles = profiles(&["A", "B", "C"]);

        let result: Result<(), _> = try_profiles(&profiles, |profile| {
            let name = name_of(profile);
            async move { Err(TestError::Rejected(name)) }
        })
        .await;

        assert_eq!(result, Err(TestError::Rejected("C")));
    }

    #[tokio::test]
    async fn test_first_success_skips_remaining() {
        let profiles = profiles(&["A", "B"]);
        let calls = Mutex::new(0);

        let result = try_profiles(&profiles, |_| {
            *calls.lock().unwrap() += 1;
            async { Ok::<_, TestError>(42) }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_profile_list() {
        let result: Result<(), TestError> =
            try_profiles(&[], |_| async { Ok(()) }).await;
        assert_eq!(result, Err(TestError::Empty));
    }
}
