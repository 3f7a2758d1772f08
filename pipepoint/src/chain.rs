use crate::handler::{Handler, Head, TransportInjector};
use crate::message::Exchange;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static POINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stable identity of a pipeline point, unique within the process.
///
/// Context-bound copies of a point share the identity of the static point they were
/// produced from, which is what hooks are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointId(u64);

impl PointId {
    pub(crate) fn next() -> Self {
        PointId(POINT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A static point: handler plus links, immutable once the chain is built.
pub(crate) struct Stage<X: Exchange> {
    pub(crate) id: PointId,
    pub(crate) handler: Rc<dyn Handler<X>>,
    pub(crate) next: Option<usize>,
    pub(crate) prev: Option<usize>,
}

impl<X: Exchange> Stage<X> {
    fn new(handler: Rc<dyn Handler<X>>) -> Self {
        Self {
            id: PointId::next(),
            handler,
            next: None,
            prev: None,
        }
    }
}

/// Arena of static points linked by index, shared read-only by every context.
pub(crate) struct Chain<X: Exchange> {
    stages: Vec<Stage<X>>,
}

impl<X: Exchange> Chain<X> {
    /// Builds a chain for `handlers` (outer-most first) ending in a transport-injection
    /// stage, with a no-op head in front.
    ///
    /// The fold starts at the transport side, so points are created tail first; the arena
    /// is then laid out in forward order. No handler is invoked here.
    pub(crate) fn build(
        handlers: &[Rc<dyn Handler<X>>],
        transport: Option<Rc<dyn Handler<X>>>,
    ) -> Rc<Self> {
        let terminal = Stage::new(Rc::new(TransportInjector::new(transport)));
        let mut stages = handlers
            .iter()
            .rev()
            .fold(vec![terminal], |mut stages, handler| {
                stages.push(Stage::new(Rc::clone(handler)));
                stages
            });
        stages.push(Stage::new(Rc::new(Head)));
        stages.reverse();

        let last = stages.len() - 1;
        for (index, stage) in stages.iter_mut().enumerate() {
            stage.prev = index.checked_sub(1);
            stage.next = (index < last).then_some(index + 1);
        }

        Rc::new(Self { stages })
    }

    pub(crate) fn stage(&self, index: usize) -> &Stage<X> {
        &self.stages[index]
    }

    /// Number of points, including head and transport injection.
    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{RESERVED_HEAD_NAME, RESERVED_TRANSPORT_NAME, handler_fn};
    use crate::point::Point;

    struct Text;

    impl Exchange for Text {
        type Request = String;
        type Response = String;
        type Error = String;
    }

    fn stage(name: &'static str) -> Rc<dyn Handler<Text>> {
        Rc::new(handler_fn(
            name,
            |_: &Point<Text>| -> crate::Result<(), String> {
                panic!("handlers must not run while the chain is built")
            },
        ))
    }

    #[test]
    fn stages_are_laid_out_in_declared_order() {
        let chain = Chain::build(&[stage("a"), stage("b"), stage("c")], None);

        let names: Vec<&str> = (0..chain.len())
            .map(|i| chain.stage(i).handler.name())
            .collect();
        assert_eq!(
            names,
            [RESERVED_HEAD_NAME, "a", "b", "c", RESERVED_TRANSPORT_NAME]
        );
    }

    #[test]
    fn links_are_symmetric() {
        let chain = Chain::build(&[stage("a"), stage("b")], None);

        assert_eq!(chain.stage(0).prev, None);
        assert_eq!(chain.stage(chain.len() - 1).next, None);
        for i in 0..chain.len() - 1 {
            assert_eq!(chain.stage(i).next, Some(i + 1));
            assert_eq!(chain.stage(i + 1).prev, Some(i));
        }
    }

    #[test]
    fn points_are_created_from_the_transport_outward() {
        let chain = Chain::build(&[stage("a"), stage("b")], None);

        let ids: Vec<PointId> = (0..chain.len()).map(|i| chain.stage(i).id).collect();
        // tail is created first, head last
        assert!(ids.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn empty_handler_list_still_has_head_and_tail() {
        let chain = Chain::<Text>::build(&[], None);
        assert_eq!(chain.len(), 2);
    }
}
