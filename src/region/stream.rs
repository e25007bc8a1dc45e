//! Streaming regions - regions fed by a `Stream` instead of a render function.
//!
//! The synchronous pass renders nothing and queues a microtask that starts the
//! pump on the local executor. The pump awaits items one at a time. Before
//! applying an item it checks that the region's version has not moved since it
//! started waiting; if it has, the region was re-rendered or unmounted behind
//! its back and the pump stops quietly. A pump abandoned this way never polls
//! its stream again; unmounting the region aborts and drops it.
//!
//! Errors yielded by the stream are raised on the region's scope, where an
//! interceptor installed with `on_catch` can turn them into a retry or an error
//! view.

use futures::StreamExt;
use futures::stream::LocalBoxStream;

use super::{Region, RegionSource};
use crate::error::Result;
use crate::render::collect;
use crate::scheduler;
use crate::scope::{self, in_scope};
use crate::types::Rendered;
use crate::view::{StreamFactory, View};

/// Create a region whose content follows the items of the factory's stream.
pub(crate) fn render_stream(factory: StreamFactory) -> Region {
    Region::new(RegionSource::Stream, move |region| {
        let region = region.clone();
        let factory = factory.clone();
        scheduler::queue_microtask(move || start_pump(region, factory));
        Ok(Rendered::default())
    })
}

fn start_pump(region: Region, factory: StreamFactory) {
    if region.is_disposed() {
        return;
    }
    let scope = region.scope().clone();
    let stream = scope::run_with(&scope, || factory());
    let handle = scheduler::spawn_local(in_scope(scope, pump(region.clone(), stream)));
    region.set_pump(handle);
    tracing::debug!(region = %region.id(), "stream pump started");
}

async fn pump(region: Region, mut stream: LocalBoxStream<'static, Result<View>>) {
    loop {
        let version = region.version();
        let item = stream.next().await;

        if region.is_disposed() || region.version() != version {
            tracing::debug!(region = %region.id(), "stream pump abandoned");
            return;
        }

        match item {
            Some(Ok(view)) => region.update(|| collect(view)),
            Some(Err(error)) => {
                tracing::debug!(region = %region.id(), %error, "stream failed");
                region.scope().raise(error);
                return;
            }
            None => {
                tracing::debug!(region = %region.id(), "stream finished");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use futures::channel::mpsc;
    use futures::{StreamExt, future, stream};

    use crate::error::RenderError;
    use crate::hooks::{get_active_scope, on_cleanup};
    use crate::host::Node;
    use crate::region::RegionState;
    use crate::render::render;
    use crate::scheduler::{reset_scheduler, tick};
    use crate::scope::{Scope, reset_scope_state, run_with};
    use crate::view::View;

    fn setup() {
        reset_scheduler();
        reset_scope_state();
    }

    fn mounted(view: View) -> (Node, crate::render::RenderResult) {
        let root = Node::element("root");
        let result = render(view);
        root.append_child(&result.node).unwrap();
        (root, result)
    }

    #[test]
    fn test_stream_renders_nothing_synchronously() {
        setup();

        let (root, result) = mounted(View::stream(|| stream::iter(vec![Ok::<_, RenderError>("a")])));
        assert_eq!(root.text_content(), "", "first pass should render nothing");
        assert_eq!(result.region.as_ref().unwrap().version(), 1);

        tick();
        assert_eq!(root.text_content(), "a");
        result.dispose();
    }

    #[test]
    fn test_stream_each_item_replaces_content() {
        setup();

        let (tx, rx) = mpsc::unbounded::<Result<String, RenderError>>();
        let rx = Rc::new(RefCell::new(Some(rx)));
        let (root, result) = mounted(View::stream(move || rx.borrow_mut().take().unwrap()));
        let region = result.region.clone().unwrap();
        tick();

        tx.unbounded_send(Ok("one".into())).unwrap();
        tick();
        assert_eq!(root.text_content(), "one");
        assert_eq!(region.version(), 2);

        tx.unbounded_send(Ok("two".into())).unwrap();
        tick();
        assert_eq!(root.text_content(), "two");
        assert_eq!(region.version(), 3);
        assert_eq!(region.nodes().len(), 1, "previous item's node should be gone");

        result.dispose();
    }

    #[test]
    fn test_stream_error_reaches_interceptor() {
        setup();

        let caught = Rc::new(RefCell::new(Vec::new()));
        let caught_clone = caught.clone();
        let owner = Scope::root();
        owner.set_interceptor(move |error, _rethrow| caught_clone.borrow_mut().push(error.to_string()));

        let result = run_with(&owner, || {
            render(View::stream(|| {
                stream::iter(vec![Ok("fine".to_string()), Err(RenderError::Stream("lost connection".into()))])
            }))
        });
        let root = Node::element("root");
        root.append_child(&result.node).unwrap();
        tick();

        assert_eq!(root.text_content(), "fine", "items before the error stay rendered");
        assert_eq!(caught.borrow().len(), 1);
        assert!(caught.borrow()[0].contains("lost connection"));
        result.dispose();
    }

    #[test]
    fn test_stream_pump_stops_on_unmount() {
        setup();

        let (tx, rx) = mpsc::unbounded::<Result<&'static str, RenderError>>();
        let rx = Rc::new(RefCell::new(Some(rx)));
        let (root, result) = mounted(View::stream(move || rx.borrow_mut().take().unwrap()));
        let region = result.region.clone().unwrap();
        tick();

        tx.unbounded_send(Ok("before")).unwrap();
        tick();
        let version = region.version();

        region.unmount();
        let _ = tx.unbounded_send(Ok("after"));
        tick();

        assert_eq!(region.version(), version, "no pass after unmount");
        assert_eq!(root.text_content(), "");
        assert!(tx.is_closed(), "aborting the pump should drop the receiver");
    }

    #[test]
    fn test_stream_pump_abandoned_after_external_render() {
        setup();

        let (tx, rx) = mpsc::unbounded::<Result<&'static str, RenderError>>();
        let rx = Rc::new(RefCell::new(Some(rx)));
        let (root, result) = mounted(View::stream(move || rx.borrow_mut().take().unwrap()));
        let region = result.region.clone().unwrap();
        tick();

        region.update(|| crate::render::collect(View::from("external")));
        tx.unbounded_send(Ok("stale")).unwrap();
        tick();

        assert_eq!(root.text_content(), "external", "stale item must not be applied");
        result.dispose();
    }

    #[test]
    fn test_stream_body_runs_in_region_scope() {
        setup();

        let seen = Rc::new(RefCell::new(None));
        let cleaned = Rc::new(Cell::new(false));
        let (root, result) = mounted(View::stream({
            let seen = seen.clone();
            let cleaned = cleaned.clone();
            move || {
                let seen = seen.clone();
                let cleaned = cleaned.clone();
                stream::once(async { Ok::<_, RenderError>("ready") }).chain(stream::once(async move {
                    *seen.borrow_mut() = get_active_scope();
                    on_cleanup(move || cleaned.set(true));
                    future::pending::<Result<&'static str, RenderError>>().await
                }))
            }
        }));
        let region = result.region.clone().unwrap();
        tick();

        assert_eq!(root.text_content(), "ready");
        assert_eq!(seen.borrow().clone(), Some(region.scope().clone()));
        assert_eq!(region.scope().pending_cleanups(), 1, "cleanup attached to the region");
        assert!(!cleaned.get());

        result.dispose();
        tick();
        assert!(cleaned.get(), "drained on unmount");
    }

    #[test]
    fn test_stream_inside_parent_pass_is_settled() {
        setup();

        let seen = Rc::new(RefCell::new(None));
        let result = render(View::component({
            let seen = seen.clone();
            move || {
                let inner = render(View::stream(|| stream::iter(vec![Ok::<_, RenderError>("late")])));
                let region = inner.region.clone().unwrap();
                *seen.borrow_mut() = Some((region.state(), region.version()));
                inner.dispose();
                View::Empty
            }
        }));

        assert_eq!(seen.borrow().clone(), Some((RegionState::Settled, 1)));
        result.dispose();
        tick();
    }
}
