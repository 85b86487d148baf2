use super::entry::{CatalogEntry, InstallStatus};
use rustc_hash::FxHashMap;
use unicode_normalization::UnicodeNormalization;

/// The merged set of listing entries known locally. This is the only place
/// entries live; every list the consumer shows is derived from it.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: FxHashMap<String, CatalogEntry>,
    generation: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Bumped on every change so cached views know to rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the whole mapping with freshly loaded entries.
    pub fn replace(&mut self, entries: Vec<CatalogEntry>) {
        self.entries = entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        self.generation += 1;
    }

    pub fn set_rating(&mut self, id: &str, rating: i32) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.rating = rating;
                self.generation += 1;
                true
            }
            None => false,
        }
    }

    pub fn set_status(&mut self, id: &str, status: InstallStatus) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.status != status => {
                entry.status = status;
                self.generation += 1;
                true
            }
            _ => false,
        }
    }

    pub fn newest_add_date(&self) -> Option<i64> {
        self.entries.values().map(|e| e.add_date).max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListView {
    All,
    /// Entries added after the last-seen time of the previous run.
    New,
    Installed,
    Rated,
    Search(String),
}

/// Derives the ids of a view, newest first, ties broken by title.
pub fn derive_view(catalog: &Catalog, view: &ListView, last_time: i64) -> Vec<String> {
    let needle = match view {
        ListView::Search(query) => Some(normalize_for_search(query)),
        _ => None,
    };

    let mut selected: Vec<&CatalogEntry> = catalog
        .entries()
        .filter(|entry| match view {
            ListView::All => true,
            ListView::New => entry.add_date > last_time,
            ListView::Installed => entry.is_installed(),
            ListView::Rated => entry.is_rated(),
            ListView::Search(_) => needle
                .as_deref()
                .is_some_and(|needle| matches_search(entry, needle)),
        })
        .collect();

    selected.sort_by(|a, b| {
        b.add_date
            .cmp(&a.add_date)
            .then_with(|| a.title.cmp(&b.title))
    });
    selected.into_iter().map(|entry| entry.id.clone()).collect()
}

fn matches_search(entry: &CatalogEntry, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    normalize_for_search(&entry.title).contains(needle)
        || entry
            .tags
            .iter()
            .any(|tag| normalize_for_search(tag).contains(needle))
}

/// Lowercase, strip accents and collapse everything that isn't alphanumeric.
pub fn normalize_for_search(text: &str) -> String {
    let folded: String = text
        .nfkd()
        .filter(|c| c.is_ascii() || c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Memoizes derived views per view, `last_time` and catalog generation.
#[derive(Debug, Default)]
pub struct ViewCache {
    cached: Vec<CachedView>,
}

#[derive(Debug)]
struct CachedView {
    view: ListView,
    last_time: i64,
    generation: u64,
    ids: Vec<String>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, catalog: &Catalog, view: &ListView, last_time: i64) -> &[String] {
        let generation = catalog.generation();
        let position = self
            .cached
            .iter()
            .position(|c| c.view == *view && c.last_time == last_time);

        let index = match position {
            Some(index) if self.cached[index].generation == generation => index,
            Some(index) => {
                let cached = &mut self.cached[index];
                cached.ids = derive_view(catalog, view, last_time);
                cached.generation = generation;
                index
            }
            None => {
                self.cached.push(CachedView {
                    view: view.clone(),
                    last_time,
                    generation,
                    ids: derive_view(catalog, view, last_time),
                });
                self.cached.len() - 1
            }
        };
        &self.cached[index].ids
    }

    pub fn invalidate(&mut self) {
        self.cached.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        let mut catalog = Catalog::new();
        let mut tagged = CatalogEntry::new("c", "Café Pirate", "cafe-pirate", 300);
        tagged.tags = vec!["Roguelike".to_string()];
        catalog.replace(vec![
            CatalogEntry::new("a", "Alpha Quest", "alpha", 100),
            CatalogEntry::new("b", "Beta Racer", "beta", 200),
            tagged,
        ]);
        catalog
    }

    #[test]
    fn views_are_sorted_newest_first() {
        let catalog = sample();
        assert_eq!(derive_view(&catalog, &ListView::All, 0), vec!["c", "b", "a"]);
        assert_eq!(derive_view(&catalog, &ListView::New, 150), vec!["c", "b"]);
    }

    #[test]
    fn installed_and_rated_follow_entry_state() {
        let mut catalog = sample();
        assert!(derive_view(&catalog, &ListView::Installed, 0).is_empty());

        catalog.set_status("a", InstallStatus::Installed);
        catalog.set_rating("b", 5);
        assert_eq!(derive_view(&catalog, &ListView::Installed, 0), vec!["a"]);
        assert_eq!(derive_view(&catalog, &ListView::Rated, 0), vec!["b"]);
    }

    #[test]
    fn search_ignores_case_and_accents() {
        let catalog = sample();
        let search = |q: &str| derive_view(&catalog, &ListView::Search(q.to_string()), 0);
        assert_eq!(search("CAFE"), vec!["c"]);
        assert_eq!(search("rogue"), vec!["c"]);
        assert_eq!(search("racer"), vec!["b"]);
        assert!(search("zzz").is_empty());
    }

    #[test]
    fn view_cache_rebuilds_on_generation_change() {
        let mut catalog = sample();
        let mut cache = ViewCache::new();

        assert!(cache.get(&catalog, &ListView::Installed, 0).is_empty());
        catalog.set_status("b", InstallStatus::Installed);
        assert_eq!(cache.get(&catalog, &ListView::Installed, 0), ["b".to_string()]);
    }

    #[test]
    fn view_cache_keys_on_last_time() {
        let catalog = sample();
        let mut cache = ViewCache::new();

        assert_eq!(cache.get(&catalog, &ListView::New, 150), ["c", "b"]);
        assert_eq!(cache.get(&catalog, &ListView::New, 250), ["c"]);
        assert_eq!(cache.get(&catalog, &ListView::New, 150), ["c", "b"]);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut catalog = sample();
        let generation = catalog.generation();
        assert!(!catalog.set_rating("missing", 3));
        assert!(!catalog.set_status("missing", InstallStatus::Installed));
        assert_eq!(catalog.generation(), generation);
    }
}
