//! Projects a flat prefix/delimiter listing into the immediate children of
//! one virtual folder.

use crate::models::entry::{Entry, RawListing};
use std::collections::BTreeMap;

/// Turns raw listings into sorted, de-duplicated [`Entry`] values.
#[derive(Clone, Copy, Debug)]
pub struct NamespaceProjector {
    delimiter: char,
}

impl Default for NamespaceProjector {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DELIMITER)
    }
}

impl NamespaceProjector {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    /// Project one listing taken for `listing.prefix`.
    ///
    /// - a common prefix becomes a folder named after its last segment
    /// - a key equal to the prefix is the folder marker and is skipped
    /// - a key directly below the prefix becomes a file
    /// - a key nested deeper (store ignored the delimiter) contributes a
    ///   folder for its first segment
    ///
    /// Output is folders first, then files, each ordered by name. Entries
    /// sharing an `id` collapse into one.
    pub fn project(&self, listing: &RawListing) -> Vec<Entry> {
        let prefix = listing.prefix.as_str();
        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();

        for common in &listing.common_prefixes {
            let Some(rest) = common.strip_prefix(prefix) else {
                continue;
            };
            let name = rest.strip_suffix(self.delimiter).unwrap_or(rest);
            if name.is_empty() || name.contains(self.delimiter) {
                continue;
            }
            entries
                .entry(common.clone())
                .or_insert_with(|| Entry::folder(common.clone(), name, listing.listed_at));
        }

        for object in &listing.objects {
            if object.key == prefix {
                continue;
            }
            let Some(rest) = object.key.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }

            match rest.find(self.delimiter) {
                None => {
                    let last_modified = object.last_modified.unwrap_or(listing.listed_at);
                    entries.insert(
                        object.key.clone(),
                        Entry::file(object.key.clone(), rest, object.size, last_modified),
                    );
                }
                Some(0) => {}
                Some(pos) => {
                    let name = &rest[..pos];
                    let id = format!("{}{}{}", prefix, name, self.delimiter);
                    entries
                        .entry(id.clone())
                        .or_insert_with(|| Entry::folder(id, name, listing.listed_at));
                }
            }
        }

        let mut out: Vec<Entry> = entries.into_values().collect();
        out.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        out
    }
}

/// Keep entries whose name contains `term`, ignoring case. A blank term keeps
/// everything.
pub fn filter_entries(entries: Vec<Entry>, term: &str) -> Vec<Entry> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|e| e.name.to_lowercase().contains(&term))
        .collect()
}

/// Render a byte count with a 1024 base, e.g. `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::{EntryKind, ListedObject};
    use crate::services::path::PathNavigator;
    use chrono::{TimeZone, Utc};

    fn object(key: &str, size: u64) -> ListedObject {
        ListedObject {
            key: key.into(),
            size,
            last_modified: Some(Utc.with_ymd_and_hms(2024, 1, 13, 9, 30, 0).unwrap()),
        }
    }

    fn listing(prefix: &str, prefixes: &[&str], objects: Vec<ListedObject>) -> RawListing {
        RawListing {
            prefix: prefix.into(),
            common_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            objects,
            listed_at: Utc::now(),
        }
    }

    #[test]
    fn docs_listing_yields_folder_then_file() {
        let raw = listing("docs/", &["docs/photos/"], vec![object("docs/readme.txt", 120)]);
        let entries = NamespaceProjector::default().project(&raw);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "photos");
        assert_eq!(entries[0].kind, EntryKind::Folder);
        assert_eq!(entries[0].id, "docs/photos/");
        assert_eq!(entries[0].size, None);
        assert_eq!(entries[1].name, "readme.txt");
        assert_eq!(entries[1].kind, EntryKind::File);
        assert_eq!(entries[1].size, Some(120));
    }

    #[test]
    fn folder_marker_is_never_emitted() {
        let raw = listing(
            "docs/",
            &["docs/"],
            vec![object("docs/", 0), object("docs/a.txt", 1)],
        );
        let entries = NamespaceProjector::default().project(&raw);
        assert_eq!(entries.len(), 1);
        assert!(entries.iter().all(|e| e.id != "docs/"));
        assert!(entries.iter().all(|e| !e.name.is_empty()));
    }

    #[test]
    fn root_listing_orders_folders_before_files() {
        let raw = listing(
            "",
            &["zeta/", "alpha/"],
            vec![object("b.txt", 2), object("a.txt", 1)],
        );
        let names: Vec<_> = NamespaceProjector::default()
            .project(&raw)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["alpha", "zeta", "a.txt", "b.txt"]);
    }

    #[test]
    fn nested_keys_collapse_into_one_folder() {
        let raw = listing(
            "",
            &["photos/"],
            vec![object("photos/2024/a.jpg", 5), object("photos/b.jpg", 7)],
        );
        let entries = NamespaceProjector::default().project(&raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "photos/");
        assert!(entries[0].is_folder());
    }

    #[test]
    fn child_marker_keys_are_not_files() {
        let raw = listing("docs/", &[], vec![object("docs/old/", 0)]);
        let entries = NamespaceProjector::default().project(&raw);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_folder());
        assert_eq!(entries[0].id, "docs/old/");
    }

    #[test]
    fn descending_into_folders_reproduces_their_ids() {
        let nav = PathNavigator::default();
        let path = nav.parse("media/raw/");
        let raw = listing(
            &nav.to_prefix(&path),
            &["media/raw/2023/", "media/raw/2024/"],
            vec![object("media/raw/index.json", 9)],
        );
        for entry in NamespaceProjector::default().project(&raw) {
            if entry.is_folder() {
                let child = nav.descend(&path, &entry.name);
                assert_eq!(nav.to_prefix(&child), entry.id);
            }
        }
    }

    #[test]
    fn missing_timestamp_falls_back_to_listing_time() {
        let mut raw = listing("", &[], vec![]);
        raw.objects.push(ListedObject {
            key: "x.bin".into(),
            size: 3,
            last_modified: None,
        });
        let entries = NamespaceProjector::default().project(&raw);
        assert_eq!(entries[0].last_modified, raw.listed_at);
    }

    #[test]
    fn filter_is_case_insensitive() {
        let raw = listing("", &["Reports/"], vec![object("report.pdf", 1), object("data.csv", 2)]);
        let entries = NamespaceProjector::default().project(&raw);
        let hits = filter_entries(entries.clone(), "REPORT");
        assert_eq!(hits.len(), 2);
        assert_eq!(filter_entries(entries, "  ").len(), 3);
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(512), "512 Bytes");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1_024_000), "1000 KB");
        assert_eq!(format_size(2_097_152), "2 MB");
        assert_eq!(format_size(15_728_640), "15 MB");
    }
}
