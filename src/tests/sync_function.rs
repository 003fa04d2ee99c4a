use std::cell::Cell;
use std::rc::Rc;

use super::{Page, rendered};
use crate::{Component, DuplicateKeys, Element, RenderError, h};

fn greeting() -> Component {
    Component::function("Greeting", |props, _ctx| {
        rendered(h("div").child(format!("Hello {}", props.str("message").unwrap_or_default())))
    })
}

#[test]
fn renders_and_rerenders_in_place() {
    let page = Page::new();
    let greeting = greeting();

    page.block_on(page.render(h("main").child(greeting.element().prop("message", "world"))))
        .unwrap();
    assert_eq!(page.html(), "<main><div>Hello world</div></main>");
    let main = page.dom.children(page.root)[0];
    let div = page.dom.children(main)[0];

    page.block_on(page.render(h("main").child(greeting.element().prop("message", "Alice"))))
        .unwrap();
    assert_eq!(page.html(), "<main><div>Hello Alice</div></main>");
    assert_eq!(page.dom.children(main), vec![div]);
}

#[test]
fn copy_keeps_previous_output() {
    let page = Page::new();
    let calls = Rc::new(Cell::new(0));
    let counted = Component::function("Counted", {
        let calls = calls.clone();
        move |_props, _ctx| {
            calls.set(calls.get() + 1);
            rendered(h("span").child(calls.get()))
        }
    });

    page.block_on(page.render(h("div").child(counted.element()))).unwrap();
    page.block_on(page.render(h("div").child(Element::copy()))).unwrap();
    assert_eq!(page.html(), "<div><span>1</span></div>");
    assert_eq!(calls.get(), 1);

    page.block_on(page.render(h("div").child(counted.element()))).unwrap();
    assert_eq!(page.html(), "<div><span>2</span></div>");
}

#[test]
fn keyed_children_move_instead_of_rerendering() {
    let page = Page::new();
    let list = |keys: &[&str]| {
        h("ul").children(keys.iter().map(|key| h("li").key(*key).child(*key)))
    };

    page.block_on(page.render(list(&["a", "b", "c"]))).unwrap();
    let ul = page.dom.children(page.root)[0];
    let before = page.dom.children(ul);

    page.block_on(page.render(list(&["c", "a", "b"]))).unwrap();
    assert_eq!(page.html(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
    assert_eq!(page.dom.children(ul), vec![before[2], before[0], before[1]]);

    page.block_on(page.render(list(&["a"]))).unwrap();
    assert_eq!(page.html(), "<ul><li>a</li></ul>");
    assert_eq!(page.dom.children(ul), vec![before[0]]);
}

#[test]
fn attributes_are_patched() {
    let page = Page::new();
    page.block_on(page.render(h("div").prop("id", "a").prop("class", "x"))).unwrap();
    page.block_on(page.render(h("div").prop("id", "b"))).unwrap();
    assert_eq!(page.html(), r#"<div id="b"></div>"#);
}

#[test]
fn changing_tags_replaces_nodes() {
    let page = Page::new();
    page.block_on(page.render(h("div").child("text"))).unwrap();
    page.block_on(page.render(h("div").child(h("span").child("element")))).unwrap();
    assert_eq!(page.html(), "<div><span>element</span></div>");
    page.block_on(page.render(h("div").child(Element::raw("<b>raw</b>")))).unwrap();
    assert_eq!(page.html(), "<div><b>raw</b></div>");
}

#[test]
fn fragments_and_lists_flatten() {
    let page = Page::new();
    let child = h("div").child(Element::fragment(["a", "b"])).child(vec![
        crate::Child::from("c"),
        crate::Child::Empty,
        crate::Child::from(h("i")),
    ]);
    page.block_on(page.render(child)).unwrap();
    assert_eq!(page.html(), "<div>abc<i></i></div>");
}

#[test]
fn duplicate_keys_fail_by_default() {
    let page = Page::new();
    let result = page.block_on(page.render(h("ul").child(h("li").key(1)).child(h("li").key(1))));
    assert!(matches!(result, Err(RenderError::DuplicateKey { .. })));
}

#[test]
fn duplicate_keys_only_skip_their_own_list() {
    let page = Page::new();
    page.block_on(page.render(h("div").child(h("ul")).child(h("p").child("old"))))
        .unwrap();

    let result = page.block_on(page.render(
        h("div")
            .child(h("ul").child(h("li").key("a")).child(h("li").key("a")))
            .child(h("p").child("new")),
    ));
    assert!(matches!(result, Err(RenderError::DuplicateKey { .. })));
    assert_eq!(page.html(), "<div><ul></ul><p>new</p></div>");

    page.block_on(page.render(
        h("div")
            .child(h("ul").child(h("li").key("a")).child(h("li").key("b")))
            .child(h("p").child("newer")),
    ))
    .unwrap();
    assert_eq!(page.html(), "<div><ul><li></li><li></li></ul><p>newer</p></div>");
}

#[test]
fn duplicate_keys_below_a_component_keep_its_siblings() {
    let page = Page::new();
    let listing = Component::function("Listing", |props, _ctx| {
        let keys: Vec<String> = props
            .str("keys")
            .unwrap_or_default()
            .split(',')
            .map(str::to_owned)
            .collect();
        rendered(h("ol").children(keys.into_iter().map(|key| h("li").key(key.clone()).child(key))))
    });
    let greeting = greeting();
    let view = |keys: &str, message: &str| {
        h("div")
            .child(listing.element().prop("keys", keys))
            .child(greeting.element().prop("message", message))
    };

    page.block_on(page.render(view("a", "world"))).unwrap();
    let result = page.block_on(page.render(view("b,b", "Alice")));
    assert!(matches!(result, Err(RenderError::DuplicateKey { .. })));
    assert_eq!(
        page.html(),
        "<div><ol><li>a</li></ol><div>Hello Alice</div></div>"
    );
}

#[test]
fn duplicate_keys_can_be_tolerated() {
    let page = Page::new();
    let renderer = page
        .runtime
        .builder(page.dom.clone())
        .duplicate_keys(DuplicateKeys::Warn)
        .build();
    let result = page.block_on(renderer.render(
        h("ul").child(h("li").key(1).child("a")).child(h("li").key(1).child("b")),
        &page.root,
    ));
    assert!(result.is_ok());
    assert_eq!(page.html(), "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn component_errors_reach_the_completion() {
    let page = Page::new();
    let broken = Component::function("Broken", |_props, _ctx| Err(anyhow::anyhow!("boom")));
    let result = page.block_on(page.render(h("div").child(broken.element())));
    match result {
        Err(error) => assert_eq!(error.to_string(), "component `Broken` failed: boom"),
        Ok(()) => panic!("render should fail"),
    }
}

#[test]
fn rendering_nothing_unmounts() {
    let page = Page::new();
    page.block_on(page.render(h("div").child(greeting().element()))).unwrap();
    page.block_on(page.render(crate::Child::Empty)).unwrap();
    assert_eq!(page.html(), "");

    page.block_on(page.render(h("p"))).unwrap();
    page.block_on(page.renderer.unmount(&page.root)).unwrap();
    assert_eq!(page.html(), "");
}
