//! Lookup table from component names to renderers. Hosts own the registry and
//! feed it snapshots; the reducer never sees it.

use crate::state::SessionState;
use crate::types::ComponentSpec;
use std::collections::HashMap;

pub trait Renderer<Out>: Send + Sync {
    fn render(&self, spec: &ComponentSpec) -> Out;
}

impl<Out, F> Renderer<Out> for F
where
    F: Fn(&ComponentSpec) -> Out + Send + Sync,
{
    fn render(&self, spec: &ComponentSpec) -> Out {
        self(spec)
    }
}

pub struct ComponentRegistry<Out> {
    renderers: HashMap<String, Box<dyn Renderer<Out>>>,
    fallback: Option<Box<dyn Renderer<Out>>>,
}

impl<Out> Default for ComponentRegistry<Out> {
    fn default() -> Self {
        Self {
            renderers: HashMap::new(),
            fallback: None,
        }
    }
}

impl<Out> ComponentRegistry<Out> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `renderer` for `component`, returning the one it replaced.
    pub fn register(
        &mut self,
        component: impl Into<String>,
        renderer: impl Renderer<Out> + 'static,
    ) -> Option<Box<dyn Renderer<Out>>> {
        self.renderers.insert(component.into(), Box::new(renderer))
    }

    /// Used for components with no registered renderer.
    pub fn with_fallback(mut self, renderer: impl Renderer<Out> + 'static) -> Self {
        self.fallback = Some(Box::new(renderer));
        self
    }

    pub fn contains(&self, component: &str) -> bool {
        self.renderers.contains_key(component)
    }

    pub fn render(&self, spec: &ComponentSpec) -> Option<Out> {
        self.renderers
            .get(&spec.component)
            .or(self.fallback.as_ref())
            .map(|renderer| renderer.render(spec))
    }

    /// Renders the session's current component, if it has one.
    pub fn render_state(&self, state: &SessionState) -> Option<Out> {
        state
            .component_spec
            .as_ref()
            .and_then(|spec| self.render(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(component: &str) -> ComponentSpec {
        ComponentSpec {
            component: component.to_string(),
            props: json!({"word": "ephemeral"}),
            intention: "teach".to_string(),
            target_level: "B2".to_string(),
        }
    }

    struct WordRenderer;

    impl Renderer<String> for WordRenderer {
        fn render(&self, spec: &ComponentSpec) -> String {
            format!("word:{}", spec.props["word"].as_str().unwrap_or_default())
        }
    }

    #[test]
    fn test_dispatches_by_component_name() {
        let mut registry = ComponentRegistry::new();
        registry.register("VocabCard", WordRenderer);
        registry.register("StoryReader", |spec: &ComponentSpec| {
            format!("story:{}", spec.intention)
        });

        assert!(registry.contains("VocabCard"));
        assert_eq!(
            registry.render(&spec("VocabCard")).as_deref(),
            Some("word:ephemeral")
        );
        assert_eq!(
            registry.render(&spec("StoryReader")).as_deref(),
            Some("story:teach")
        );
        assert_eq!(registry.render(&spec("Quiz")), None);
    }

    #[test]
    fn test_fallback_covers_unknown_components() {
        let registry = ComponentRegistry::new()
            .with_fallback(|spec: &ComponentSpec| format!("unknown:{}", spec.component));
        assert_eq!(
            registry.render(&spec("Quiz")).as_deref(),
            Some("unknown:Quiz")
        );
    }

    #[test]
    fn test_render_state_without_component_is_none() {
        let registry = ComponentRegistry::new().with_fallback(|_: &ComponentSpec| 1u8);
        assert_eq!(registry.render_state(&SessionState::new()), None);

        let mut state = SessionState::new();
        state.component_spec = Some(spec("Quiz"));
        assert_eq!(registry.render_state(&state), Some(1));
    }

    #[test]
    fn test_register_replaces_previous_renderer() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.register("VocabCard", |_: &ComponentSpec| "a").is_none());
        assert!(registry.register("VocabCard", |_: &ComponentSpec| "b").is_some());
        assert_eq!(registry.render(&spec("VocabCard")), Some("b"));
    }
}
