//! Action routing table.
//!
//! Built once at startup from the listener flags and the enabled sinks.
//! Download, upload and write fan out to every enabled sink; delete is
//! recognised and gated like the others but routes to no sink at all.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ListenerConfig;
use crate::event::Action;
use crate::sink::Sink;

/// Where an action goes.
#[derive(Debug)]
pub enum Route<'a> {
    /// The action's listener flag is off
    Disabled,
    /// Enabled, but no sink acts on this action
    NoSinks,
    Dispatch(&'a [Arc<dyn Sink>]),
}

#[derive(Debug)]
struct RouteEntry {
    enabled: bool,
    sinks: Vec<Arc<dyn Sink>>,
}

#[derive(Debug)]
pub struct ActionRouter {
    routes: HashMap<Action, RouteEntry>,
}

impl ActionRouter {
    /// `sinks` are the enabled sink adapters, in invocation order.
    pub fn new(listener: &ListenerConfig, sinks: Vec<Arc<dyn Sink>>) -> Self {
        let routes = Action::ALL
            .into_iter()
            .map(|action| {
                let targets = match action {
                    Action::Download | Action::Upload | Action::Write => sinks.clone(),
                    // Deletion is not propagated to sinks.
                    Action::Delete => Vec::new(),
                };
                let entry = RouteEntry {
                    enabled: listener.is_enabled(action),
                    sinks: targets,
                };
                (action, entry)
            })
            .collect();

        Self { routes }
    }

    pub fn route(&self, action: Action) -> Route<'_> {
        match self.routes.get(&action) {
            Some(entry) if !entry.enabled => Route::Disabled,
            Some(entry) if entry.sinks.is_empty() => Route::NoSinks,
            Some(entry) => Route::Dispatch(&entry.sinks),
            None => Route::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::event::ChangeEvent;
    use crate::sink::SinkError;

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl Sink for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn apply(&self, _event: &ChangeEvent) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn all_enabled() -> ListenerConfig {
        ListenerConfig {
            download: true,
            upload: true,
            write: true,
            delete: true,
            ignore: Vec::new(),
        }
    }

    fn sinks() -> Vec<Arc<dyn Sink>> {
        vec![Arc::new(Named("cloud")), Arc::new(Named("mirror"))]
    }

    fn names(route: Route<'_>) -> Vec<&'static str> {
        match route {
            Route::Dispatch(sinks) => sinks.iter().map(|s| s.name()).collect(),
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn test_transfer_actions_fan_out_to_all_sinks() {
        let router = ActionRouter::new(&all_enabled(), sinks());
        for action in [Action::Download, Action::Upload, Action::Write] {
            assert_eq!(names(router.route(action)), vec!["cloud", "mirror"]);
        }
    }

    #[test]
    fn test_delete_never_reaches_a_sink() {
        let router = ActionRouter::new(&all_enabled(), sinks());
        assert!(matches!(router.route(Action::Delete), Route::NoSinks));

        let router = ActionRouter::new(&ListenerConfig::default(), sinks());
        assert!(matches!(router.route(Action::Delete), Route::Disabled));
    }

    #[test]
    fn test_disabled_actions() {
        let listener = ListenerConfig {
            upload: true,
            ..Default::default()
        };
        let router = ActionRouter::new(&listener, sinks());

        assert!(matches!(router.route(Action::Download), Route::Disabled));
        assert!(matches!(router.route(Action::Write), Route::Disabled));
        assert_eq!(names(router.route(Action::Upload)), vec!["cloud", "mirror"]);
    }

    #[test]
    fn test_no_enabled_sinks() {
        let router = ActionRouter::new(&all_enabled(), Vec::new());
        for action in Action::ALL {
            assert!(matches!(router.route(action), Route::NoSinks));
        }
    }
}
