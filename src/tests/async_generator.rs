use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use futures::StreamExt;
use futures::channel::mpsc;

use super::{Page, assert_elapsed, rendered, sleep};
use crate::{Child, Component, Context, Element, Props, coroutine, h};

fn message(props: &Props) -> String {
    props.str("message").unwrap_or_default().to_owned()
}

#[test]
fn yields_once_per_update_until_it_returns() {
    let page = Page::new();
    let component = Component::async_generator("Greeter", |_props: Props, ctx: Context| {
        coroutine(move |co| async move {
            let mut updates = ctx.props_stream();
            let mut count = 0;
            while let Some(props) = updates.next().await {
                count += 1;
                if count == 3 {
                    return rendered(h("span").child("Final"));
                }
                co.yield_(h("span").child(format!("{} {count}", message(&props)))).await;
            }
            rendered(())
        })
    });
    let render = || page.block_on(page.render(component.element().prop("message", "Hello")));

    render().unwrap();
    assert_eq!(page.html(), "<span>Hello 1</span>");
    render().unwrap();
    assert_eq!(page.html(), "<span>Hello 2</span>");
    render().unwrap();
    assert_eq!(page.html(), "<span>Final</span>");
    render().unwrap();
    assert_eq!(page.html(), "<span>Final</span>");
}

#[test]
fn intermediate_yields_show_up() {
    let page = Page::new();
    let component = Component::async_generator("Loader", |_props: Props, ctx: Context| {
        coroutine(move |co| async move {
            let mut updates = ctx.props_stream();
            while let Some(props) = updates.next().await {
                co.yield_(h("span").child("Loading...")).await;
                sleep(25).await;
                co.yield_(h("span").child(message(&props))).await;
            }
            rendered(())
        })
    });

    page.block_on(async {
        page.render(component.element().prop("message", "Hello")).await.unwrap();
        assert_eq!(page.html(), "<span>Loading...</span>");
        sleep(75).await;
        assert_eq!(page.html(), "<span>Hello</span>");
    });
}

#[test]
fn synchronous_yields_collapse() {
    let page = Page::new();
    let component = Component::async_generator("Eager", |_props: Props, ctx: Context| {
        coroutine(move |co| async move {
            let mut updates = ctx.props_stream();
            while let Some(props) = updates.next().await {
                co.yield_("Loading...").await;
                co.yield_(message(&props)).await;
            }
            rendered(())
        })
    });

    page.block_on(async {
        page.render(h("div").child(component.element().prop("message", "Hello")))
            .await
            .unwrap();
        sleep(10).await;
        assert_eq!(page.html(), "<div>Hello</div>");
    });
}

#[test]
fn busy_generators_only_see_the_latest_props() {
    let page = Page::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let component = Component::async_generator("Busy", {
        let seen = seen.clone();
        move |_props: Props, ctx: Context| {
            let seen = seen.clone();
            coroutine(move |co| async move {
                let mut updates = ctx.props_stream();
                while let Some(props) = updates.next().await {
                    seen.borrow_mut().push(message(&props));
                    co.yield_(message(&props)).await;
                    sleep(25).await;
                }
                rendered(())
            })
        }
    });
    let render = |n: u32| page.render(component.element().prop("message", n.to_string()));

    page.block_on(async {
        render(1).await.unwrap();
        let pending: Vec<_> = (2..=4).map(render).collect();
        for completion in pending {
            completion.await.unwrap();
            assert_eq!(page.html(), "4");
        }
    });
    assert_eq!(*seen.borrow(), vec!["1", "4"]);
}

#[test]
fn generators_that_never_pull_props_still_settle_renders() {
    let page = Page::new();
    let (tx, rx) = mpsc::unbounded::<String>();
    let rx = Rc::new(RefCell::new(Some(rx)));
    let component = Component::async_generator("Repeater", move |_props: Props, _ctx: Context| {
        let rx = rx.borrow_mut().take();
        coroutine(move |co| async move {
            let Some(mut rx) = rx else {
                return rendered(());
            };
            while let Some(text) = rx.next().await {
                co.yield_(text).await;
            }
            rendered("closed")
        })
    });

    tx.unbounded_send("Hello".to_owned()).unwrap();
    page.block_on(page.render(h("div").child(component.element()))).unwrap();
    assert_eq!(page.html(), "<div>Hello</div>");

    tx.unbounded_send("World".to_owned()).unwrap();
    page.runtime.run_until_stalled();
    assert_eq!(page.html(), "<div>World</div>");

    page.block_on(async {
        let rerender = page.render(h("div").child(component.element()));
        tx.unbounded_send("Again".to_owned()).unwrap();
        rerender.await.unwrap();
    });
    assert_eq!(page.html(), "<div>Again</div>");

    drop(tx);
    page.runtime.run_until_stalled();
    assert_eq!(page.html(), "<div>closed</div>");
}

#[test]
fn updates_inside_fragments_reach_the_parent() {
    let page = Page::new();
    let component = Component::async_generator("Ticker", |_props: Props, _ctx: Context| {
        coroutine(|co| async move {
            co.yield_("1").await;
            sleep(25).await;
            co.yield_("2").await;
            std::future::pending::<()>().await;
            rendered(())
        })
    });

    page.block_on(async {
        page.render(h("div").child(Element::fragment([component.element()])))
            .await
            .unwrap();
        assert_eq!(page.html(), "<div>1</div>");
        sleep(75).await;
        assert_eq!(page.html(), "<div>2</div>");
    });
}

#[test]
fn unmounting_ends_the_props_stream() {
    let page = Page::new();
    let cleaned = Rc::new(Cell::new(false));
    let component = Component::async_generator("Cleanup", {
        let cleaned = cleaned.clone();
        move |_props: Props, ctx: Context| {
            let cleaned = cleaned.clone();
            coroutine(move |co| async move {
                let mut updates = ctx.props_stream();
                while updates.next().await.is_some() {
                    co.yield_("mounted").await;
                }
                cleaned.set(true);
                rendered(())
            })
        }
    });

    page.block_on(page.render(component.element())).unwrap();
    assert_eq!(page.html(), "mounted");
    page.block_on(page.renderer.unmount(&page.root)).unwrap();
    page.runtime.run_until_stalled();
    assert!(cleaned.get());
    assert_eq!(page.html(), "");
}

#[test]
fn stream_errors_reject_pending_renders() {
    let page = Page::new();
    let component = Component::async_generator("Broken", |_props: Props, _ctx: Context| {
        coroutine(|_co| async {
            sleep(10).await;
            Err::<Child, _>(anyhow::anyhow!("stream failed"))
        })
    });

    let result = page.block_on(page.render(component.element()));
    match result {
        Err(error) => assert_eq!(error.to_string(), "component `Broken` failed: stream failed"),
        Ok(()) => panic!("render should fail"),
    }
    assert!(page.block_on(page.render(component.element())).is_ok());
}

#[test]
fn async_children_commit_in_request_order() {
    let page = Page::new();
    let child = Component::async_function("Child", |props: Props, _ctx: Context| async move {
        sleep(25).await;
        rendered(h("span").child(message(&props)))
    });
    let component = Component::async_generator("Parent", move |_props: Props, ctx: Context| {
        let child = child.clone();
        coroutine(move |co| async move {
            let mut updates = ctx.props_stream();
            while let Some(props) = updates.next().await {
                co.yield_(child.element().prop("message", message(&props))).await;
            }
            rendered(())
        })
    });

    page.block_on(async {
        let first = page.render(component.element().prop("message", "1"));
        // Let the generator pull the first props and park on the next pull.
        sleep(5).await;
        let second = page.render(component.element().prop("message", "2"));
        first.await.unwrap();
        assert_eq!(page.html(), "<span>1</span>");
        second.await.unwrap();
        assert_eq!(page.html(), "<span>2</span>");
    });
}

type Slot = Rc<RefCell<Option<Context>>>;

fn labelled(name: &'static str, ms: u64) -> Component {
    Component::async_function(name, move |_props: Props, _ctx: Context| async move {
        sleep(ms).await;
        rendered(h("div").child(name))
    })
}

/// Yields a 200ms child and a 100ms child in turn, one per pulled update.
fn alternating(slot: Slot) -> Component {
    let slow = labelled("Slow", 200);
    let fast = labelled("Fast", 100);
    Component::async_generator("Alternating", move |_props: Props, ctx: Context| {
        *slot.borrow_mut() = Some(ctx.clone());
        let (slow, fast) = (slow.clone(), fast.clone());
        coroutine(move |co| async move {
            let mut updates = ctx.props_stream();
            let mut turn = 0;
            while updates.next().await.is_some() {
                let child = if turn % 2 == 0 { &slow } else { &fast };
                co.yield_(child.element()).await;
                turn += 1;
            }
            rendered(())
        })
    })
}

#[test]
fn racing_renders_settle_with_the_newest_child() {
    let page = Page::new();
    let component = alternating(Slot::default());

    page.block_on(async {
        let started = Instant::now();
        page.render(component.element()).await.unwrap();
        assert_elapsed(started, 200);
        assert_eq!(page.html(), "<div>Slow</div>");

        page.render(component.element()).await.unwrap();
        assert_elapsed(started, 300);
        assert_eq!(page.html(), "<div>Fast</div>");

        let third = page.render(component.element());
        page.render(component.element()).await.unwrap();
        assert_elapsed(started, 400);
        assert_eq!(page.html(), "<div>Fast</div>");
        third.await.unwrap();
        assert_elapsed(started, 400);
        assert_eq!(page.html(), "<div>Fast</div>");

        // The superseded Slow call settles at 500ms and must not show.
        sleep(250).await;
        assert_eq!(page.html(), "<div>Fast</div>");
    });
}

#[test]
fn racing_refreshes_settle_with_the_newest_child() {
    let page = Page::new();
    let slot = Slot::default();
    let component = alternating(Rc::clone(&slot));
    let ctx = || slot.borrow().clone().unwrap();

    page.block_on(async {
        let started = Instant::now();
        page.render(component.element()).await.unwrap();
        assert_elapsed(started, 200);
        assert_eq!(page.html(), "<div>Slow</div>");

        ctx().refresh().await.unwrap();
        assert_elapsed(started, 300);
        assert_eq!(page.html(), "<div>Fast</div>");

        let third = ctx().refresh();
        ctx().refresh().await.unwrap();
        assert_elapsed(started, 400);
        assert_eq!(page.html(), "<div>Fast</div>");
        third.await.unwrap();
        assert_elapsed(started, 400);

        sleep(250).await;
        assert_eq!(page.html(), "<div>Fast</div>");
    });
}

#[test]
fn yielded_async_children_run_once_per_pull() {
    let page = Page::new();
    let calls = Rc::new(Cell::new(0));
    let (done_tx, done_rx) = mpsc::unbounded::<()>();
    let child = Component::async_function("Async", {
        let calls = calls.clone();
        move |props: Props, _ctx: Context| {
            calls.set(calls.get() + 1);
            let done = done_tx.clone();
            async move {
                sleep(100).await;
                let _ = done.unbounded_send(());
                let id = props.str("id").unwrap_or_default().to_owned();
                rendered(h("div").prop("id", id.clone()).child(id))
            }
        }
    });
    let done_rx = Rc::new(RefCell::new(Some(done_rx)));
    let component = Component::async_generator("Parent", move |_props: Props, ctx: Context| {
        let child = child.clone();
        let mut done = done_rx.borrow_mut().take();
        coroutine(move |co| async move {
            let mut updates = ctx.props_stream();
            let mut id = 0;
            while updates.next().await.is_some() {
                co.yield_(child.element().prop("id", id.to_string())).await;
                // Pull the next props only once the child has resolved.
                if let Some(done) = done.as_mut() {
                    done.next().await;
                }
                id += 1;
            }
            rendered(())
        })
    });

    page.block_on(async {
        let started = Instant::now();
        page.render(component.element()).await.unwrap();
        assert_elapsed(started, 100);
        assert_eq!(page.html(), r#"<div id="0">0</div>"#);
        sleep(5).await;

        let renders: Vec<_> = (0..4).map(|_| page.render(component.element())).collect();
        let mut renders = renders.into_iter();
        renders.next().unwrap().await.unwrap();
        assert_elapsed(started, 200);
        assert_eq!(page.html(), r#"<div id="1">1</div>"#);
        // The other three collapse into one pull.
        for pending in renders {
            pending.await.unwrap();
            assert_elapsed(started, 300);
            assert_eq!(page.html(), r#"<div id="2">2</div>"#);
        }
    });
    assert_eq!(calls.get(), 3);
}
