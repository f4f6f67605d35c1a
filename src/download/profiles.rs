use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client identity presented to the upstream video host
///
/// `extractor_args` maps extractor name to argument name to values, e.g.
/// `youtube -> player_client -> ["android"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub name: String,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub extractor_args: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl ClientProfile {
    /// Built-in profiles in priority order: android, web, ios
    pub fn defaults() -> Vec<ClientProfile> {
        vec![
            ClientProfile {
                name: "android".to_string(),
                http_headers: headers(&[
                    (
                        "User-Agent",
                        "com.google.android.youtube/18.17.36 (Linux; U; Android 13; en_US) gzip",
                    ),
                    ("Accept-Language", "en-US,en;q=0.9"),
                    ("X-YouTube-Client-Name", "3"),
                    ("X-YouTube-Client-Version", "18.17.36"),
                ]),
                extractor_args: youtube_args(&[
                    ("player_client", &["android"]),
                    ("skip", &["dash", "configs"]),
                ]),
            },
            ClientProfile {
                name: "web".to_string(),
                http_headers: headers(&[
                    (
                        "User-Agent",
                        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                    ),
                    ("Accept-Language", "en-US,en;q=0.9"),
                ]),
                extractor_args: youtube_args(&[("player_client", &["web"])]),
            },
            ClientProfile {
                name: "ios".to_string(),
                http_headers: headers(&[
                    ("User-Agent", "YouTube/18.15.1 CFNetwork/1240.0.4 Darwin/20.6.0"),
                    ("Accept-Language", "en-US,en;q=0.9"),
                    ("X-YouTube-Client-Name", "5"),
                    ("X-YouTube-Client-Version", "18.15.1"),
                ]),
                extractor_args: youtube_args(&[
                    ("player_client", &["ios"]),
                    ("skip", &["dash", "configs"]),
                ]),
            },
        ]
    }

    /// `--add-header` values in `Name:Value` form
    pub fn header_flags(&self) -> Vec<String> {
        self.http_headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect()
    }

    /// `--extractor-args` values, one per extractor:
    /// `youtube:player_client=android;skip=dash,configs`
    pub fn extractor_arg_flags(&self) -> Vec<String> {
        self.extractor_args
            .iter()
            .filter(|(_, args)| !args.is_empty())
            .map(|(extractor, args)| {
                let joined = args
                    .iter()
                    .map(|(key, values)| format!("{key}={}", values.join(",")))
                    .collect::<Vec<_>>()
                    .join(";");
                format!("{extractor}:{joined}")
            })
            .collect()
    }
}

fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn youtube_args(args: &[(&str, &[&str])]) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    let args = args
        .iter()
        .map(|(key, values)| {
            (
                key.to_string(),
                values.iter().map(|value| value.to_string()).collect(),
            )
        })
        .collect();
    BTreeMap::from([("youtube".to_string(), args)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority_order() {
        let names: Vec<_> = ClientProfile::defaults()
            .into_iter()
            .map(|profile| profile.name)
            .collect();
        assert_eq!(names, vec!["android", "web", "ios"]);
    }

    #[test]
    fn test_extractor_arg_flags() {
        let profiles = ClientProfile::defaults();
        assert_eq!(
            profiles[0].extractor_arg_flags(),
            vec!["youtube:player_client=android;skip=dash,configs"]
        );
        assert_eq!(
            profiles[1].extractor_arg_flags(),
            vec!["youtube:player_client=web"]
        );
    }

    #[test]
    fn test_header_flags() {
        let web = &ClientProfile::defaults()[1];
        let flags = web.header_flags();
        assert_eq!(flags.len(), 2);
        assert!(flags.contains(&"Accept-Language:en-US,en;q=0.9".to_string()));
        assert!(flags.iter().any(|flag| flag.starts_with("User-Agent:Mozilla/5.0")));
    }

    #[test]
    fn test_profile_without_args_has_no_flags() {
        let bare = ClientProfile {
            name: "bare".to_string(),
            http_headers: BTreeMap::new(),
            extractor_args: BTreeMap::from([("youtube".to_string(), BTreeMap::new())]),
        };
        assert!(bare.header_flags().is_empty());
        assert!(bare.extractor_arg_flags().is_empty());
    }
}
