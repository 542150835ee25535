// src/channel.rs

//! Deterministic channel priority ordering
//!
//! Candidates from competing channels are tie-broken by a priority index:
//! lower numbers win. Each configured channel root seeds three default
//! variants beyond the root itself — the platform-specific subdir, an
//! any-platform wildcard, and the no-architecture subdir — at increasing
//! offsets, in that preference order. Previously unseen channels inherit the
//! priority of the variant they match (exactly or fuzzily) and bump the
//! matched variant by one, so exact-match variants win ties over repeated
//! fuzzy hits. Entirely new roots are appended after all known roots, which
//! keeps tie-breaking order-stable across runs for the same channel list.

use regex::Regex;
use tracing::debug;
use url::Url;

/// Priority distance between consecutive channel roots
const ROOT_STRIDE: i32 = 10;

/// One priority entry under a channel root
#[derive(Debug, Clone)]
struct Variant {
    name: String,
    priority: i32,
}

impl Variant {
    /// Fuzzy match: `*` in the variant name expands to any subdir text
    fn matches(&self, channel: &str) -> bool {
        if self.name == channel {
            return true;
        }
        if !self.name.contains('*') {
            return false;
        }
        let mut expr = String::from("^");
        for c in self.name.chars() {
            if c == '*' {
                expr.push_str("[^/]*");
            } else {
                expr.push_str(&regex::escape(&c.to_string()));
            }
        }
        expr.push('$');
        Regex::new(&expr).map(|re| re.is_match(channel)).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
struct ChannelRoot {
    root: String,
    variants: Vec<Variant>,
}

/// Priority index over configured channels; lower priority is preferred
#[derive(Debug, Clone)]
pub struct ChannelPriorityIndex {
    platform: String,
    roots: Vec<ChannelRoot>,
}

impl ChannelPriorityIndex {
    /// Seed the index from the configured channel list, in order
    pub fn new(channels: &[String], platform: &str) -> Self {
        let mut index = Self {
            platform: platform.to_string(),
            roots: Vec::new(),
        };
        for channel in channels {
            index.priority(channel);
        }
        index
    }

    /// Priority of a channel; unseen channels are folded into the index so
    /// repeated queries return a stable answer.
    pub fn priority(&mut self, channel: &str) -> i32 {
        let channel = normalized(channel);
        let root = channel_root(&channel);

        let position = match self.roots.iter().position(|r| r.root == root) {
            Some(position) => position,
            None => {
                let base = self.roots.len() as i32 * ROOT_STRIDE;
                debug!("Appending channel root '{}' at priority {}", root, base);
                self.roots.push(seed_root(&root, base, &self.platform));
                self.roots.len() - 1
            }
        };
        let entry = &mut self.roots[position];

        if let Some(variant) = entry.variants.iter().find(|v| v.name == channel) {
            return variant.priority;
        }

        // Fuzzy hit: the new channel inherits the matched variant's priority
        // and the matched variant yields future ties by one step.
        if let Some(matched) = entry.variants.iter().position(|v| v.matches(&channel)) {
            let inherited = entry.variants[matched].priority;
            entry.variants[matched].priority += 1;
            entry.variants.push(Variant {
                name: channel.clone(),
                priority: inherited,
            });
            debug!("Channel '{}' inherits priority {}", channel, inherited);
            return inherited;
        }

        // Nothing matched under the root: record at the root's lowest rank
        let worst = entry
            .variants
            .iter()
            .map(|v| v.priority)
            .max()
            .unwrap_or(0)
            + 1;
        entry.variants.push(Variant {
            name: channel,
            priority: worst,
        });
        worst
    }

    /// The configured channel name a raw channel/URL corresponds to, if any
    pub fn configured_name(&self, raw: &str) -> Option<String> {
        let root = channel_root(&normalized(raw));
        self.roots
            .iter()
            .find(|r| r.root == root)
            .map(|r| r.root.clone())
    }
}

fn seed_root(root: &str, base: i32, platform: &str) -> ChannelRoot {
    ChannelRoot {
        root: root.to_string(),
        variants: vec![
            Variant {
                name: root.to_string(),
                priority: base,
            },
            Variant {
                name: format!("{root}/{platform}"),
                priority: base + 1,
            },
            Variant {
                name: format!("{root}/*"),
                priority: base + 2,
            },
            Variant {
                name: format!("{root}/noarch"),
                priority: base + 3,
            },
        ],
    }
}

/// Strip a URL down to its channel path ("https://host/conda-forge/linux-64"
/// → "conda-forge/linux-64"); plain channel names pass through.
fn normalized(channel: &str) -> String {
    if let Ok(url) = Url::parse(channel) {
        if url.has_host() {
            return url.path().trim_matches('/').to_string();
        }
    }
    channel.trim_matches('/').to_string()
}

/// The root component of a channel ("conda-forge/linux-64" → "conda-forge")
pub fn channel_root(channel: &str) -> String {
    normalized(channel)
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
