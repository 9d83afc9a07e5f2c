//! Session routing
//!
//! An ordered list of named routes, each a guard predicate over session
//! metadata plus the controller that handles matching sessions. Routes are
//! configured once at startup and read-only thereafter; dispatch is
//! first-match, not best-match.

use crate::call::SessionProfile;
use crate::controller::CallHandler;
use crate::error::{EngineError, Result};
use crate::process::Process;
use std::sync::Arc;
use tracing::debug;

type Predicate = Box<dyn Fn(&SessionProfile) -> bool + Send + Sync>;

/// A named guard-predicate + controller pair
pub struct Route {
    name: String,
    predicate: Predicate,
    handler: Arc<dyn CallHandler>,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Predicates are pure functions of session metadata; they must not
    /// block or mutate session state.
    pub fn matches(&self, profile: &SessionProfile) -> bool {
        (self.predicate)(profile)
    }
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    fallback: Option<Arc<dyn CallHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; evaluation order is registration order
    pub fn add_route<P>(&mut self, name: impl Into<String>, predicate: P, handler: Arc<dyn CallHandler>)
    where
        P: Fn(&SessionProfile) -> bool + Send + Sync + 'static,
    {
        self.routes.push(Route {
            name: name.into(),
            predicate: Box::new(predicate),
            handler,
        });
    }

    /// Controller used when no route matches
    pub fn set_fallback(&mut self, handler: Arc<dyn CallHandler>) {
        self.fallback = Some(handler);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Pick the controller for an inbound session
    ///
    /// Consults the process readiness gate before evaluating any route: a
    /// process that is not fully running refuses admission. With no match
    /// and no fallback, the caller must reject/hang up the session.
    pub fn dispatch(&self, process: &Process, profile: &SessionProfile) -> Result<Arc<dyn CallHandler>> {
        if !process.is_accepting() {
            return Err(EngineError::ServiceUnavailable(
                process.current().to_string(),
            ));
        }

        for route in &self.routes {
            if route.matches(profile) {
                debug!(call_id = %profile.id, route = %route.name, "session routed");
                return Ok(route.handler.clone());
            }
        }

        match &self.fallback {
            Some(handler) => {
                debug!(call_id = %profile.id, "session routed to fallback");
                Ok(handler.clone())
            }
            None => Err(EngineError::NoRoute(profile.id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallId;
    use crate::controller::CallController;
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl CallHandler for NoopHandler {
        async fn run(&self, _controller: &mut CallController) -> Result<()> {
            Ok(())
        }
    }

    fn handler() -> Arc<dyn CallHandler> {
        Arc::new(NoopHandler)
    }

    fn running_process() -> Process {
        let process = Process::new();
        process.boot_complete().unwrap();
        process
    }

    fn profile_to(to: &str) -> SessionProfile {
        SessionProfile::inbound(CallId::random(), "alice", to)
    }

    #[test]
    fn test_first_match_wins_in_registration_order() {
        let mut router = Router::new();
        let first = handler();
        let second = handler();
        router.add_route("a", |p| p.to.contains("100"), first.clone());
        router.add_route("b", |p| p.to.contains("100"), second.clone());

        let chosen = router
            .dispatch(&running_process(), &profile_to("sip:100@pbx"))
            .unwrap();
        assert!(Arc::ptr_eq(&chosen, &first));
    }

    #[test]
    fn test_fallback_used_when_nothing_matches() {
        let mut router = Router::new();
        router.add_route("a", |p| p.to.contains("100"), handler());
        let fallback = handler();
        router.set_fallback(fallback.clone());

        let chosen = router
            .dispatch(&running_process(), &profile_to("sip:200@pbx"))
            .unwrap();
        assert!(Arc::ptr_eq(&chosen, &fallback));
    }

    #[test]
    fn test_no_route_without_fallback() {
        let router = Router::new();
        let result = router.dispatch(&running_process(), &profile_to("sip:200@pbx"));
        assert!(matches!(result, Err(EngineError::NoRoute(_))));
    }

    #[test]
    fn test_rejecting_process_refuses_before_route_evaluation() {
        let mut router = Router::new();
        router.add_route("all", |_| true, handler());
        let process = running_process();
        process.set_rejecting(true).unwrap();

        let result = router.dispatch(&process, &profile_to("sip:100@pbx"));
        assert_eq!(
            result.err(),
            Some(EngineError::ServiceUnavailable("rejecting".to_string()))
        );
    }

    #[test]
    fn test_stopping_process_refuses_admission() {
        let mut router = Router::new();
        router.add_route("all", |_| true, handler());
        let process = running_process();
        process.shutdown().unwrap();

        let result = router.dispatch(&process, &profile_to("sip:100@pbx"));
        assert_eq!(
            result.err(),
            Some(EngineError::ServiceUnavailable("stopping".to_string()))
        );
    }

    #[test]
    fn test_predicate_reads_headers() {
        let mut router = Router::new();
        let queue_handler = handler();
        router.add_route(
            "queued",
            |p| p.header("X-Queue").is_some(),
            queue_handler.clone(),
        );

        let profile = profile_to("sip:100@pbx").with_header("X-Queue", "support");
        let chosen = router.dispatch(&running_process(), &profile).unwrap();
        assert!(Arc::ptr_eq(&chosen, &queue_handler));
    }
}
