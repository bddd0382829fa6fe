//! Fingerprint profiles and the read-only profile table.
//!
//! A profile bundles the TLS and HTTP parameters that make an outbound
//! connection look like a specific real client. Codes are IANA registry
//! values so profiles can be declared in configuration files.
//!
//! Browser releases that put the same parameters on the wire share one
//! fingerprint family; the table registers every release name against its
//! family so callers can keep using the names they already know.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// TLS 1.3 suites
pub const TLS_AES_128_GCM_SHA256: u16 = 0x1301;
pub const TLS_AES_256_GCM_SHA384: u16 = 0x1302;
pub const TLS_CHACHA20_POLY1305_SHA256: u16 = 0x1303;

// TLS 1.2 suites
pub const TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256: u16 = 0xc02b;
pub const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: u16 = 0xc02f;
pub const TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384: u16 = 0xc02c;
pub const TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384: u16 = 0xc030;
pub const TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256: u16 = 0xcca9;
pub const TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256: u16 = 0xcca8;
pub const TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA: u16 = 0xc009;
pub const TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA: u16 = 0xc00a;
pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA: u16 = 0xc013;
pub const TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA: u16 = 0xc014;
pub const TLS_RSA_WITH_AES_128_GCM_SHA256: u16 = 0x009c;
pub const TLS_RSA_WITH_AES_256_GCM_SHA384: u16 = 0x009d;
pub const TLS_RSA_WITH_AES_128_CBC_SHA: u16 = 0x002f;
pub const TLS_RSA_WITH_AES_256_CBC_SHA: u16 = 0x0035;

// Named groups
pub const GROUP_X25519: u16 = 0x001d;
pub const GROUP_SECP256R1: u16 = 0x0017;
pub const GROUP_SECP384R1: u16 = 0x0018;
pub const GROUP_SECP521R1: u16 = 0x0019;
pub const GROUP_FFDHE2048: u16 = 0x0100;
pub const GROUP_FFDHE3072: u16 = 0x0101;
pub const GROUP_X25519_MLKEM768: u16 = 0x11ec;

// HTTP/2 SETTINGS identifiers
pub const SETTINGS_HEADER_TABLE_SIZE: u16 = 0x1;
pub const SETTINGS_ENABLE_PUSH: u16 = 0x2;
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;
pub const SETTINGS_MAX_HEADER_LIST_SIZE: u16 = 0x6;

/// HTTP/2 connection settings advertised by a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Http2Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_table_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_push: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_streams: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_stream_window_size: Option<u32>,
    /// Total connection receive window; the excess over 65535 is sent as a WINDOW_UPDATE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_connection_window_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frame_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_header_list_size: Option<u32>,
    /// SETTINGS identifiers in emission order. Set entries missing here follow in id order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings_order: Vec<u16>,
}

impl Http2Settings {
    fn value(&self, id: u16) -> Option<u32> {
        match id {
            SETTINGS_HEADER_TABLE_SIZE => self.header_table_size,
            SETTINGS_ENABLE_PUSH => self.enable_push.map(u32::from),
            SETTINGS_MAX_CONCURRENT_STREAMS => self.max_concurrent_streams,
            SETTINGS_INITIAL_WINDOW_SIZE => self.initial_stream_window_size,
            SETTINGS_MAX_FRAME_SIZE => self.max_frame_size,
            SETTINGS_MAX_HEADER_LIST_SIZE => self.max_header_list_size,
            _ => None,
        }
    }

    /// `(identifier, value)` pairs for the SETTINGS frame, in emission order.
    pub fn frame_entries(&self) -> Vec<(u16, u32)> {
        let mut entries: Vec<(u16, u32)> = Vec::with_capacity(6);
        let listed = self.settings_order.iter().copied();
        let remaining = SETTINGS_HEADER_TABLE_SIZE..=SETTINGS_MAX_HEADER_LIST_SIZE;

        for id in listed.chain(remaining) {
            if entries.iter().any(|(seen, _)| *seen == id) {
                continue;
            }
            if let Some(value) = self.value(id) {
                entries.push((id, value));
            }
        }
        entries
    }
}

/// A named client fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientProfile {
    pub name: String,
    /// Cipher suites in ClientHello preference order
    pub cipher_suites: Vec<u16>,
    /// Key exchange groups in preference order
    #[serde(default = "default_kx_groups")]
    pub kx_groups: Vec<u16>,
    #[serde(default)]
    pub http2: Http2Settings,
    /// Emit Title-Case header names on HTTP/1.1 connections
    #[serde(default = "default_title_case")]
    pub http1_title_case: bool,
}

fn default_kx_groups() -> Vec<u16> {
    vec![GROUP_X25519, GROUP_SECP256R1, GROUP_SECP384R1]
}

fn default_title_case() -> bool {
    true
}

const CHROME_CIPHERS: &[u16] = &[
    TLS_AES_128_GCM_SHA256,
    TLS_AES_256_GCM_SHA384,
    TLS_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_GCM_SHA256,
    TLS_RSA_WITH_AES_256_GCM_SHA384,
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_256_CBC_SHA,
];

const FIREFOX_CIPHERS: &[u16] = &[
    TLS_AES_128_GCM_SHA256,
    TLS_CHACHA20_POLY1305_SHA256,
    TLS_AES_256_GCM_SHA384,
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA,
    TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA,
    TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_GCM_SHA256,
    TLS_RSA_WITH_AES_256_GCM_SHA384,
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_256_CBC_SHA,
];

const SAFARI_CIPHERS: &[u16] = &[
    TLS_AES_128_GCM_SHA256,
    TLS_AES_256_GCM_SHA384,
    TLS_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA,
    TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA,
    TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
    TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_256_GCM_SHA384,
    TLS_RSA_WITH_AES_128_GCM_SHA256,
    TLS_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_CBC_SHA,
];

// Android 7 to 9 builds of OkHttp 4 negotiate TLS 1.2 only.
const OKHTTP_LEGACY_CIPHERS: &[u16] = &[
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_GCM_SHA256,
    TLS_RSA_WITH_AES_256_GCM_SHA384,
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_256_CBC_SHA,
];

const OKHTTP_CIPHERS: &[u16] = &[
    TLS_AES_128_GCM_SHA256,
    TLS_AES_256_GCM_SHA384,
    TLS_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_GCM_SHA256,
    TLS_RSA_WITH_AES_256_GCM_SHA384,
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_256_CBC_SHA,
];

/// One distinct set of wire parameters shared by a range of client releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    /// Chrome 103 to 105 and the Opera releases built on them
    ChromeLegacy,
    /// Chrome 106 to 116
    ChromePush,
    /// Chrome 117 to 130
    Chrome,
    /// Chrome 131 onwards, post-quantum key share first
    ChromePq,
    Firefox,
    /// Firefox 132 onwards
    FirefoxPq,
    /// Safari 15 and 16, desktop and mobile
    SafariLegacy,
    /// Safari 17 and 18 on iOS
    Safari,
    /// OkHttp 4 on Android 7 to 9
    OkHttpLegacy,
    /// OkHttp 4 on Android 10 to 13
    OkHttp,
}

impl Family {
    fn profile(self, name: &str) -> ClientProfile {
        let chrome_groups = vec![GROUP_X25519, GROUP_SECP256R1, GROUP_SECP384R1];
        let chrome_http2 = Http2Settings {
            header_table_size: Some(65_536),
            enable_push: Some(false),
            initial_stream_window_size: Some(6_291_456),
            initial_connection_window_size: Some(15_728_640),
            max_header_list_size: Some(262_144),
            ..Http2Settings::default()
        };
        let firefox_groups = vec![
            GROUP_X25519,
            GROUP_SECP256R1,
            GROUP_SECP384R1,
            GROUP_SECP521R1,
            GROUP_FFDHE2048,
            GROUP_FFDHE3072,
        ];
        let firefox_http2 = Http2Settings {
            header_table_size: Some(65_536),
            initial_stream_window_size: Some(131_072),
            initial_connection_window_size: Some(12_582_912),
            max_frame_size: Some(16_384),
            ..Http2Settings::default()
        };
        let safari_groups = vec![
            GROUP_X25519,
            GROUP_SECP256R1,
            GROUP_SECP384R1,
            GROUP_SECP521R1,
        ];
        let okhttp_http2 = Http2Settings {
            initial_stream_window_size: Some(16_777_216),
            initial_connection_window_size: Some(16_777_216),
            ..Http2Settings::default()
        };

        let (ciphers, kx_groups, http2, http1_title_case) = match self {
            Family::ChromeLegacy => (
                CHROME_CIPHERS,
                chrome_groups,
                Http2Settings {
                    enable_push: None,
                    max_concurrent_streams: Some(1000),
                    ..chrome_http2
                },
                true,
            ),
            Family::ChromePush => (
                CHROME_CIPHERS,
                chrome_groups,
                Http2Settings {
                    max_concurrent_streams: Some(1000),
                    ..chrome_http2
                },
                true,
            ),
            Family::Chrome => (CHROME_CIPHERS, chrome_groups, chrome_http2, true),
            Family::ChromePq => {
                let mut groups = vec![GROUP_X25519_MLKEM768];
                groups.extend(chrome_groups);
                (CHROME_CIPHERS, groups, chrome_http2, true)
            }
            Family::Firefox => (FIREFOX_CIPHERS, firefox_groups, firefox_http2, true),
            Family::FirefoxPq => {
                let mut groups = vec![GROUP_X25519_MLKEM768];
                groups.extend(firefox_groups);
                let http2 = Http2Settings {
                    enable_push: Some(false),
                    ..firefox_http2
                };
                (FIREFOX_CIPHERS, groups, http2, true)
            }
            Family::SafariLegacy => (
                SAFARI_CIPHERS,
                safari_groups,
                Http2Settings {
                    max_concurrent_streams: Some(100),
                    initial_stream_window_size: Some(4_194_304),
                    initial_connection_window_size: Some(10_551_295),
                    settings_order: vec![SETTINGS_INITIAL_WINDOW_SIZE, SETTINGS_MAX_CONCURRENT_STREAMS],
                    ..Http2Settings::default()
                },
                true,
            ),
            Family::Safari => (
                SAFARI_CIPHERS,
                safari_groups,
                Http2Settings {
                    enable_push: Some(false),
                    max_concurrent_streams: Some(100),
                    initial_stream_window_size: Some(2_097_152),
                    initial_connection_window_size: Some(10_485_760),
                    settings_order: vec![
                        SETTINGS_ENABLE_PUSH,
                        SETTINGS_INITIAL_WINDOW_SIZE,
                        SETTINGS_MAX_CONCURRENT_STREAMS,
                    ],
                    ..Http2Settings::default()
                },
                true,
            ),
            Family::OkHttpLegacy => (
                OKHTTP_LEGACY_CIPHERS,
                vec![GROUP_X25519, GROUP_SECP256R1, GROUP_SECP384R1],
                okhttp_http2,
                false,
            ),
            Family::OkHttp => (
                OKHTTP_CIPHERS,
                vec![GROUP_X25519, GROUP_SECP256R1, GROUP_SECP384R1],
                okhttp_http2,
                false,
            ),
        };

        ClientProfile {
            name: name.to_string(),
            cipher_suites: ciphers.to_vec(),
            kx_groups,
            http2,
            http1_title_case,
        }
    }
}

/// Built-in release names and the family each one resolves to.
const BUILTIN: &[(Family, &[&str])] = &[
    (
        Family::ChromeLegacy,
        &["chrome_103", "chrome_104", "chrome_105", "opera_89", "opera_90", "opera_91"],
    ),
    (
        Family::ChromePush,
        &[
            "chrome_106",
            "chrome_107",
            "chrome_108",
            "chrome_109",
            "chrome_110",
            "chrome_111",
            "chrome_112",
            "chrome_116",
        ],
    ),
    (Family::Chrome, &["chrome_117", "chrome_120", "chrome_124"]),
    (Family::ChromePq, &["chrome_131", "chrome_133"]),
    (
        Family::Firefox,
        &[
            "firefox_102",
            "firefox_104",
            "firefox_105",
            "firefox_106",
            "firefox_108",
            "firefox_110",
            "firefox_117",
            "firefox_120",
            "firefox_123",
        ],
    ),
    (Family::FirefoxPq, &["firefox_132", "firefox_133", "firefox_135"]),
    (
        Family::SafariLegacy,
        &[
            "safari_15_6_1",
            "safari_16_0",
            "safari_ipad_15_6",
            "safari_ios_15_5",
            "safari_ios_15_6",
            "safari_ios_16_0",
        ],
    ),
    (Family::Safari, &["safari_ios_17_0", "safari_ios_18_0"]),
    (
        Family::OkHttpLegacy,
        &["okhttp4_android_7", "okhttp4_android_8", "okhttp4_android_9"],
    ),
    (
        Family::OkHttp,
        &[
            "okhttp4_android_10",
            "okhttp4_android_11",
            "okhttp4_android_12",
            "okhttp4_android_13",
        ],
    ),
];

/// Profile name to fingerprint lookup, built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    profiles: HashMap<String, Arc<ClientProfile>>,
}

impl ProfileTable {
    /// Table containing the built-in browser and mobile client profiles.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for (family, names) in BUILTIN {
            for name in names.iter() {
                let profile = family.profile(name);
                table.profiles.insert(profile.name.clone(), Arc::new(profile));
            }
        }
        table
    }

    /// Add custom profiles. Names must not collide with existing entries.
    pub fn extend(&mut self, custom: Vec<ClientProfile>) -> Result<(), String> {
        for profile in custom {
            if self.profiles.contains_key(&profile.name) {
                return Err(format!("Profile '{}' is already defined", profile.name));
            }
            self.profiles.insert(profile.name.clone(), Arc::new(profile));
        }
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<Arc<ClientProfile>> {
        self.profiles.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Sorted profile names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Everything that reaches the wire, i.e. the profile minus its name.
    fn wire(profile: &ClientProfile) -> (Vec<u16>, Vec<u16>, Vec<(u16, u32)>, Option<u32>, bool) {
        (
            profile.cipher_suites.clone(),
            profile.kx_groups.clone(),
            profile.http2.frame_entries(),
            profile.http2.initial_connection_window_size,
            profile.http1_title_case,
        )
    }

    #[test]
    fn test_builtin_profiles_present() {
        let table = ProfileTable::builtin();
        for name in [
            "chrome_103",
            "chrome_110",
            "chrome_117",
            "chrome_120",
            "chrome_124",
            "chrome_131",
            "firefox_102",
            "firefox_120",
            "firefox_133",
            "safari_16_0",
            "safari_ios_16_0",
            "safari_ios_17_0",
            "opera_91",
            "okhttp4_android_7",
            "okhttp4_android_13",
        ] {
            assert!(table.contains(name), "missing profile {name}");
        }
        let expected: usize = BUILTIN.iter().map(|(_, names)| names.len()).sum();
        assert_eq!(table.len(), expected);
        assert!(table.len() >= 45);
    }

    #[test]
    fn test_families_differ_on_the_wire() {
        let table = ProfileTable::builtin();
        let representatives: Vec<_> = BUILTIN
            .iter()
            .map(|(_, names)| wire(&table.get(names[0]).unwrap()))
            .collect();

        for (i, a) in representatives.iter().enumerate() {
            for b in &representatives[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_release_names_share_their_family() {
        let table = ProfileTable::builtin();
        let chrome_117 = table.get("chrome_117").unwrap();
        let chrome_120 = table.get("chrome_120").unwrap();
        assert_eq!(chrome_120.name, "chrome_120");
        assert_eq!(wire(&chrome_117), wire(&chrome_120));

        let chrome_110 = table.get("chrome_110").unwrap();
        assert_ne!(wire(&chrome_110), wire(&chrome_120));
    }

    #[test]
    fn test_chrome_settings_by_release() {
        let table = ProfileTable::builtin();
        let settings = |name: &str| table.get(name).unwrap().http2.frame_entries();

        assert_eq!(
            settings("chrome_103"),
            vec![(1, 65_536), (3, 1000), (4, 6_291_456), (6, 262_144)]
        );
        assert_eq!(
            settings("chrome_110"),
            vec![(1, 65_536), (2, 0), (3, 1000), (4, 6_291_456), (6, 262_144)]
        );
        assert_eq!(
            settings("chrome_120"),
            vec![(1, 65_536), (2, 0), (4, 6_291_456), (6, 262_144)]
        );
        assert_eq!(table.get("chrome_131").unwrap().kx_groups[0], GROUP_X25519_MLKEM768);
    }

    #[test]
    fn test_settings_order_respected() {
        let table = ProfileTable::builtin();
        let safari = table.get("safari_16_0").unwrap();
        assert_eq!(safari.http2.frame_entries(), vec![(4, 4_194_304), (3, 100)]);

        let partial = Http2Settings {
            header_table_size: Some(4096),
            max_frame_size: Some(16_384),
            initial_stream_window_size: Some(65_535),
            settings_order: vec![SETTINGS_MAX_FRAME_SIZE, SETTINGS_MAX_FRAME_SIZE, 0x9],
            ..Http2Settings::default()
        };
        assert_eq!(
            partial.frame_entries(),
            vec![(5, 16_384), (1, 4096), (4, 65_535)]
        );
    }

    #[test]
    fn test_lookup_is_exact() {
        let table = ProfileTable::builtin();
        assert!(table.get("chrome_120").is_some());
        assert!(table.get("Chrome_120").is_none());
        assert!(table.get("chrome_120 ").is_none());
        assert!(table.get("chrome").is_none());
    }

    #[test]
    fn test_chrome_prefers_tls13_suites() {
        let table = ProfileTable::builtin();
        let chrome = table.get("chrome_120").unwrap();
        assert_eq!(
            &chrome.cipher_suites[..3],
            &[
                TLS_AES_128_GCM_SHA256,
                TLS_AES_256_GCM_SHA384,
                TLS_CHACHA20_POLY1305_SHA256
            ]
        );
        assert_eq!(chrome.http2.initial_stream_window_size, Some(6_291_456));
    }

    #[test]
    fn test_extend_rejects_duplicates() {
        let mut table = ProfileTable::builtin();
        let duplicate = Family::Firefox.profile("firefox_120");
        let err = table.extend(vec![duplicate]).unwrap_err();
        assert!(err.contains("firefox_120"));
    }

    #[test]
    fn test_extend_adds_custom_profile() {
        let mut table = ProfileTable::builtin();
        let custom = ClientProfile {
            name: "internal_scanner".to_string(),
            cipher_suites: vec![TLS_AES_128_GCM_SHA256],
            kx_groups: default_kx_groups(),
            http2: Http2Settings::default(),
            http1_title_case: false,
        };
        table.extend(vec![custom]).unwrap();
        assert!(table.contains("internal_scanner"));
        assert!(table.names().contains(&"internal_scanner"));
    }

    #[test]
    fn test_profile_yaml_defaults() {
        let yaml = r#"
name: minimal
cipher_suites: [4865, 4866]
"#;
        let profile: ClientProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(profile.cipher_suites, vec![0x1301, 0x1302]);
        assert_eq!(profile.kx_groups, default_kx_groups());
        assert!(profile.http1_title_case);
        assert_eq!(profile.http2, Http2Settings::default());
        assert!(profile.http2.frame_entries().is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let table = ProfileTable::builtin();
        let names = table.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
