//! Which scene a detection trigger runs.

use haunt_common::SceneDocument;
use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSelector {
    /// Always the same scene
    Fixed(String),
    /// Uniformly from a pool
    Random(Vec<String>),
}

impl SceneSelector {
    /// Selector described by the document settings.
    ///
    /// In random mode an empty `random_scene_list` means every main and
    /// alternative scene except the configured test scenes.
    pub fn from_document(document: &SceneDocument) -> Self {
        let settings = &document.settings;
        if !settings.random_scene_mode {
            return SceneSelector::Fixed(settings.default_scene.clone());
        }
        if settings.random_scene_list.is_empty() {
            SceneSelector::Random(document.scene_names(true))
        } else {
            SceneSelector::Random(settings.random_scene_list.clone())
        }
    }

    /// Every non-test scene, regardless of the document's mode.
    pub fn any_scene(document: &SceneDocument) -> Self {
        SceneSelector::Random(document.scene_names(true))
    }

    /// `None` only for an empty random pool.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        match self {
            SceneSelector::Fixed(name) => Some(name),
            SceneSelector::Random(pool) => pool.choose(rng).map(String::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haunt_common::Scene;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn document(random: bool, list: &[&str]) -> SceneDocument {
        let mut document = SceneDocument::default();
        for name in ["halloween_sequence", "quick_scare", "spooky"] {
            document.scenes.insert(name.to_string(), Scene::new(name));
        }
        document.settings.random_scene_mode = random;
        document.settings.random_scene_list = list.iter().map(|s| s.to_string()).collect();
        document
    }

    #[test]
    fn test_fixed_mode_uses_default_scene() {
        let selector = SceneSelector::from_document(&document(false, &[]));
        assert_eq!(selector, SceneSelector::Fixed("halloween_sequence".into()));
        assert_eq!(selector.pick(&mut rand::thread_rng()), Some("halloween_sequence"));
    }

    #[test]
    fn test_random_mode_excludes_test_scenes() {
        let selector = SceneSelector::from_document(&document(true, &[]));
        assert_eq!(
            selector,
            SceneSelector::Random(vec!["halloween_sequence".into(), "spooky".into()])
        );

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let picked = selector.pick(&mut rng).unwrap();
            assert_ne!(picked, "quick_scare");
        }
    }

    #[test]
    fn test_random_list_wins_when_given() {
        let selector = SceneSelector::from_document(&document(true, &["spooky"]));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(selector.pick(&mut rng), Some("spooky"));
    }

    #[test]
    fn test_empty_pool_picks_nothing() {
        let selector = SceneSelector::Random(Vec::new());
        assert_eq!(selector.pick(&mut rand::thread_rng()), None);
    }
}
