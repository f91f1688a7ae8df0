use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

/// Ordered list of files with a current entry and an advance rule.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<PathBuf>,
    current: Option<usize>,
    shuffle: bool,
}

impl Playlist {
    pub fn new(tracks: Vec<PathBuf>) -> Self {
        Self {
            tracks,
            current: None,
            shuffle: false,
        }
    }

    pub fn tracks(&self) -> &[PathBuf] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.map(|i| self.tracks[i].as_path())
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
    }

    /// Make `path` current, appending it if it is not queued yet.
    pub fn select(&mut self, path: &Path) -> &Path {
        let index = match self.tracks.iter().position(|t| t == path) {
            Some(i) => i,
            None => {
                self.tracks.push(path.to_path_buf());
                self.tracks.len() - 1
            }
        };
        self.current = Some(index);
        &self.tracks[index]
    }

    /// The current entry, or the first one when nothing was played yet.
    pub fn current_or_first(&mut self) -> Option<&Path> {
        if self.tracks.is_empty() {
            return None;
        }
        let index = *self.current.get_or_insert(0);
        Some(&self.tracks[index])
    }

    pub fn advance(&mut self) -> Option<&Path> {
        self.advance_with(&mut rand::thread_rng())
    }

    /// Move to the next entry and return it.
    ///
    /// In order the queue wraps from the last entry to the first. Shuffled,
    /// a random entry other than the current one is picked, so a single
    /// entry queue stays put and `None` is returned.
    pub fn advance_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<&Path> {
        if self.tracks.is_empty() {
            return None;
        }
        let next = if self.shuffle {
            let others: Vec<usize> = (0..self.tracks.len())
                .filter(|&i| Some(i) != self.current)
                .collect();
            *others.choose(rng)?
        } else {
            match self.current {
                Some(i) => (i + 1) % self.tracks.len(),
                None => 0,
            }
        };
        self.current = Some(next);
        Some(&self.tracks[next])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn queue(names: &[&str]) -> Playlist {
        Playlist::new(names.iter().map(PathBuf::from).collect())
    }

    #[test]
    fn in_order_advance_wraps() {
        let mut list = queue(&["a", "b", "c"]);
        assert_eq!(list.advance(), Some(Path::new("a")));
        assert_eq!(list.advance(), Some(Path::new("b")));
        assert_eq!(list.advance(), Some(Path::new("c")));
        assert_eq!(list.advance(), Some(Path::new("a")));
    }

    #[test]
    fn shuffle_never_repeats_the_current_entry() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut list = queue(&["a", "b", "c", "d"]);
        list.set_shuffle(true);
        list.select(Path::new("b"));

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let before = list.current_index();
            list.advance_with(&mut rng).unwrap();
            assert_ne!(list.current_index(), before);
            seen.insert(list.current_index().unwrap());
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn single_entry_shuffle_stays_put() {
        let mut list = queue(&["only"]);
        list.set_shuffle(true);
        list.select(Path::new("only"));
        assert_eq!(list.advance(), None);
        assert_eq!(list.current(), Some(Path::new("only")));

        list.set_shuffle(false);
        assert_eq!(list.advance(), Some(Path::new("only")));
    }

    #[test]
    fn select_appends_unknown_paths() {
        let mut list = queue(&["a", "b"]);
        list.select(Path::new("b"));
        assert_eq!(list.current_index(), Some(1));
        list.select(Path::new("z"));
        assert_eq!(list.len(), 3);
        assert_eq!(list.current_index(), Some(2));
        assert_eq!(list.advance(), Some(Path::new("a")));
    }

    #[test]
    fn empty_queue_has_nothing_to_play() {
        let mut list = Playlist::default();
        assert!(list.is_empty());
        assert_eq!(list.current_or_first(), None);
        assert_eq!(list.advance(), None);
    }
}
