use core::ops::AddAssign;

use tokio_util::sync::CancellationToken;

use crate::{
    Error, Result,
    adapter::SinkSession,
    emit::{Emitable, FollowOn},
    handler::{Disposition, ErrorContext, ErrorHandler},
};

/// Counters collected while walking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Nodes whose `emit` succeeded.
    pub emitted: u64,
    /// Nodes or follow-ons that failed and were skipped.
    pub failed: u64,
}

impl AddAssign for WalkStats {
    fn add_assign(&mut self, rhs: Self) {
        self.emitted += rhs.emitted;
        self.failed += rhs.failed;
    }
}

/// Drains an emitable and everything it uncovers, depth-first.
///
/// Each node is emitted before any of its follow-ons is produced; follow-ons
/// are pulled lazily from an explicit stack, so arbitrarily deep chains do
/// not grow the call stack.
///
/// A failure at any depth is wrapped with the rendering of the node it
/// belongs to and shown to the [`ErrorHandler`]: on
/// [`Disposition::Continue`] only that branch is skipped, on
/// [`Disposition::Abort`] the walk stops and returns the error. Cancellation
/// is checked before every node.
pub struct Walker<'a> {
    session: &'a mut SinkSession,
    handler: &'a dyn ErrorHandler,
    ctx: ErrorContext,
    abort: &'a CancellationToken,
    stats: WalkStats,
}

impl<'a> Walker<'a> {
    pub fn new(
        session: &'a mut SinkSession,
        handler: &'a dyn ErrorHandler,
        ctx: ErrorContext,
        abort: &'a CancellationToken,
    ) -> Self {
        Self {
            session,
            handler,
            ctx,
            abort,
            stats: WalkStats::default(),
        }
    }

    /// Totals across every walk made with this walker.
    pub const fn stats(&self) -> WalkStats {
        self.stats
    }

    /// Walks `root` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] when cancelled, or the failure the handler
    /// chose to abort on.
    pub fn walk(&mut self, root: Box<dyn Emitable>) -> Result<()> {
        let mut stack: Vec<(Box<dyn Emitable>, FollowOn)> = Vec::new();
        self.check_abort()?;
        if let Some(frame) = self.visit(root)? {
            stack.push(frame);
        }

        while let Some((parent, follow_on)) = stack.last_mut() {
            self.check_abort()?;
            match follow_on.next() {
                None => {
                    stack.pop();
                }
                Some(Ok(child)) => {
                    if let Some(frame) = self.visit(child)? {
                        stack.push(frame);
                    }
                }
                Some(Err(e)) => {
                    let error = Error::emit(format!("{parent:?}"), e);
                    self.route(error)?;
                }
            }
        }
        Ok(())
    }

    /// Counts a failure that happened before a root could be produced and
    /// shows it to the handler.
    ///
    /// # Errors
    ///
    /// Returns `error` back when the handler chooses to abort.
    pub fn reject(&mut self, error: Error) -> Result<()> {
        self.route(error)
    }

    fn visit(&mut self, mut node: Box<dyn Emitable>) -> Result<Option<(Box<dyn Emitable>, FollowOn)>> {
        match node.emit(self.session) {
            Ok(follow_on) => {
                self.stats.emitted += 1;
                Ok(Some((node, follow_on)))
            }
            Err(e) => {
                let error = Error::emit(format!("{node:?}"), e);
                self.route(error)?;
                Ok(None)
            }
        }
    }

    fn route(&mut self, error: Error) -> Result<()> {
        self.stats.failed += 1;
        match self.handler.handle(&error, &self.ctx) {
            Disposition::Continue => Ok(()),
            Disposition::Abort => Err(error),
        }
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.is_cancelled() {
            return Err(Error::Aborted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::{
        Edge, Element, Phase, Vertex,
        adapter::{MemoryOutput, MemoryStore},
        driver::id::{PassthroughIdDriver, RangedIdDriver},
        emit::{Cascade, DependentEdge, no_follow_on},
    };

    const CTX: ErrorContext = ErrorContext {
        phase: Phase::One,
        slot: 0,
    };

    fn session(store: &MemoryStore) -> SinkSession {
        SinkSession::new(
            Arc::new(MemoryOutput::with_store(store.clone())),
            Arc::new(PassthroughIdDriver),
        )
    }

    fn always(disposition: Disposition) -> impl ErrorHandler {
        move |_: &Error, _: &ErrorContext| disposition
    }

    /// A node that writes vertex `n` and uncovers node `n - 1`.
    #[derive(Debug)]
    struct Chain(u64);

    impl Emitable for Chain {
        fn emit(&mut self, session: &mut SinkSession) -> Result<FollowOn> {
            session.write(&mut Vertex::new(self.0, "chain").into())?;
            if self.0 == 0 {
                return Ok(no_follow_on());
            }
            let next: Box<dyn Emitable> = Box::new(Self(self.0 - 1));
            Ok(Box::new(core::iter::once(Ok(next))))
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Emitable for Failing {
        fn emit(&mut self, _: &mut SinkSession) -> Result<FollowOn> {
            Err(Error::Codec {
                reason: "boom".into(),
            })
        }
    }

    fn boxed(e: impl Emitable + 'static) -> Result<Box<dyn Emitable>> {
        Ok(Box::new(e))
    }

    #[test]
    fn deep_chain_writes_every_node_once() {
        const DEPTH: u64 = 100_000;
        let store = MemoryStore::default();
        let mut session = session(&store);
        let handler = always(Disposition::Abort);
        let token = CancellationToken::new();
        let mut walker = Walker::new(&mut session, &handler, CTX, &token);

        walker.walk(Box::new(Chain(DEPTH))).unwrap();
        assert_eq!(
            walker.stats(),
            WalkStats {
                emitted: DEPTH + 1,
                failed: 0
            }
        );
        let ids: Vec<u64> = store.vertices().iter().map(|v| v.id).collect();
        assert_eq!(ids, (0..=DEPTH).rev().collect::<Vec<_>>());
    }

    #[test]
    fn continue_skips_only_the_failing_branch() {
        let store = MemoryStore::default();
        let mut session = session(&store);
        let handler = always(Disposition::Continue);
        let token = CancellationToken::new();
        let mut walker = Walker::new(&mut session, &handler, CTX, &token);

        let root = Cascade::new(
            Vertex::new(1, "root"),
            vec![
                boxed(Failing),
                Err(Error::IdSpaceExhausted),
                boxed(Chain(2)),
            ],
        );
        walker.walk(Box::new(root)).unwrap();

        assert_eq!(
            walker.stats(),
            WalkStats {
                emitted: 4,
                failed: 2
            }
        );
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn abort_returns_the_wrapped_error() {
        let store = MemoryStore::default();
        let mut session = session(&store);
        let seen = Mutex::new(Vec::new());
        let handler = |e: &Error, _: &ErrorContext| {
            seen.lock().push(e.to_string());
            Disposition::Abort
        };
        let token = CancellationToken::new();
        let mut walker = Walker::new(&mut session, &handler, CTX, &token);

        let root = Cascade::new(Vertex::new(1, "root"), vec![boxed(Failing), boxed(Chain(0))]);
        let err = walker.walk(Box::new(root)).unwrap_err();

        assert!(matches!(err, Error::Emit { .. }));
        assert!(matches!(err.root_cause(), Error::Codec { .. }));
        assert_eq!(seen.lock().len(), 1);
        // The sibling after the failure is never emitted.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_follow_on_is_attributed_to_its_parent() {
        let store = MemoryStore::default();
        let mut session = session(&store);
        let handler = always(Disposition::Abort);
        let token = CancellationToken::new();
        let mut walker = Walker::new(&mut session, &handler, CTX, &token);

        let root = Cascade::new(Vertex::new(7, "parent"), vec![Err(Error::IdSpaceExhausted)]);
        let err = walker.walk(Box::new(root)).unwrap_err();
        match err {
            Error::Emit { element, .. } => assert!(element.contains("parent")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn cancellation_stops_before_the_next_node() {
        let store = MemoryStore::default();
        let mut session = session(&store);
        let handler = always(Disposition::Continue);
        let token = CancellationToken::new();
        token.cancel();
        let mut walker = Walker::new(&mut session, &handler, CTX, &token);

        assert!(matches!(
            walker.walk(Box::new(Chain(3))),
            Err(Error::Aborted)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn dependent_edge_writes_its_vertex_first() {
        let store = MemoryStore::default();
        let mut session = SinkSession::new(
            Arc::new(MemoryOutput::with_store(store.clone())),
            Arc::new(RangedIdDriver::new(500, 1_000)),
        );
        let handler = always(Disposition::Abort);
        let token = CancellationToken::new();
        let mut walker = Walker::new(&mut session, &handler, CTX, &token);

        walker
            .walk(Box::new(DependentEdge::new(Edge::new("knows", 1, 2), "person")))
            .unwrap();

        assert_eq!(
            store.elements(),
            vec![
                Element::from(Vertex::new(500, "person")),
                Element::from(Edge::new("knows", 1, 500)),
            ]
        );
    }
}
