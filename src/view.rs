//! Typed view over the search modal's DOM anchors.
//!
//! The controller never looks elements up by id. A [`ModalView`] resolves
//! all seven anchors once, at bind time, and fails with a single
//! [`ViewError::MissingAnchors`] naming every absent one. Everything after
//! that goes through the typed handles.
//!
//! [`Dom`] abstracts the document. [`MemoryDom`] is a headless
//! implementation used by tests and by `site search`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use crate::render::ResultsPane;

pub const HIDDEN_CLASS: &str = "hidden";
pub const SELECTED_CLASS: &str = "selected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    Modal,
    Input,
    Results,
    Loading,
    Trigger,
    Close,
    Backdrop,
}

impl Anchor {
    pub const ALL: [Anchor; 7] = [
        Anchor::Modal,
        Anchor::Input,
        Anchor::Results,
        Anchor::Loading,
        Anchor::Trigger,
        Anchor::Close,
        Anchor::Backdrop,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Anchor::Modal => "search-modal",
            Anchor::Input => "search-input",
            Anchor::Results => "search-results",
            Anchor::Loading => "search-loading",
            Anchor::Trigger => "search-trigger",
            Anchor::Close => "search-close",
            Anchor::Backdrop => "search-backdrop",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ViewError {
    #[error("search modal: required DOM elements missing: {}", join_anchors(.0))]
    MissingAnchors(Vec<Anchor>),
}

fn join_anchors(anchors: &[Anchor]) -> String {
    anchors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Minimal document operations the search modal needs.
pub trait Dom: Send + 'static {
    type Node: Clone + Send + 'static;

    fn element_by_id(&self, id: &str) -> Option<Self::Node>;
    fn has_class(&self, node: &Self::Node, class: &str) -> bool;
    fn add_class(&mut self, node: &Self::Node, class: &str);
    fn remove_class(&mut self, node: &Self::Node, class: &str);
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);
    fn value(&self, node: &Self::Node) -> String;
    fn set_value(&mut self, node: &Self::Node, value: &str);
    fn focus(&mut self, node: &Self::Node);
    fn set_display(&mut self, node: &Self::Node, display: &str);
    /// Replaces every child of `node`.
    fn set_inner_html(&mut self, node: &Self::Node, html: String);
    /// Toggles `class` on the `index`-th result element inside `node`.
    fn set_child_class(&mut self, node: &Self::Node, index: usize, class: &str, on: bool);
    fn scroll_child_into_view(&mut self, node: &Self::Node, index: usize);
    fn body_overflow(&self) -> String;
    fn set_body_overflow(&mut self, value: &str);
    fn navigate(&mut self, href: &str);
}

/// The search modal's anchors, resolved and validated.
pub struct ModalView<D: Dom> {
    dom: D,
    modal: D::Node,
    input: D::Node,
    results: D::Node,
    loading: D::Node,
    // Click targets are routed by the event source; the handles prove
    // the elements exist.
    _trigger: D::Node,
    _close: D::Node,
    _backdrop: D::Node,
}

impl<D: Dom> ModalView<D> {
    pub fn bind(dom: D) -> Result<Self, ViewError> {
        let mut missing = Vec::new();
        let mut resolve = |anchor: Anchor| {
            let node = dom.element_by_id(anchor.id());
            if node.is_none() {
                missing.push(anchor);
            }
            node
        };

        let modal = resolve(Anchor::Modal);
        let input = resolve(Anchor::Input);
        let results = resolve(Anchor::Results);
        let loading = resolve(Anchor::Loading);
        let trigger = resolve(Anchor::Trigger);
        let close = resolve(Anchor::Close);
        let backdrop = resolve(Anchor::Backdrop);

        match (modal, input, results, loading, trigger, close, backdrop) {
            (
                Some(modal),
                Some(input),
                Some(results),
                Some(loading),
                Some(trigger),
                Some(close),
                Some(backdrop),
            ) => Ok(Self {
                dom,
                modal,
                input,
                results,
                loading,
                _trigger: trigger,
                _close: close,
                _backdrop: backdrop,
            }),
            _ => Err(ViewError::MissingAnchors(missing)),
        }
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn is_open(&self) -> bool {
        !self.dom.has_class(&self.modal, HIDDEN_CLASS)
    }

    pub fn show(&mut self) {
        self.dom.remove_class(&self.modal, HIDDEN_CLASS);
        self.dom.set_attribute(&self.input, "aria-expanded", "true");
    }

    pub fn hide(&mut self) {
        self.dom.add_class(&self.modal, HIDDEN_CLASS);
        self.dom.set_attribute(&self.input, "aria-expanded", "false");
    }

    pub fn focus_input(&mut self) {
        self.dom.focus(&self.input);
    }

    pub fn input_value(&self) -> String {
        self.dom.value(&self.input)
    }

    pub fn set_input_value(&mut self, value: &str) {
        self.dom.set_value(&self.input, value);
    }

    pub fn set_loading(&mut self, visible: bool) {
        let display = if visible { "block" } else { "none" };
        self.dom.set_display(&self.loading, display);
    }

    pub fn render(&mut self, pane: &ResultsPane) {
        self.dom.set_inner_html(&self.results, pane.to_html());
    }

    pub fn mark_selected(&mut self, count: usize, selected: Option<usize>) {
        for i in 0..count {
            self.dom
                .set_child_class(&self.results, i, SELECTED_CLASS, Some(i) == selected);
        }
    }

    pub fn scroll_into_view(&mut self, index: usize) {
        self.dom.scroll_child_into_view(&self.results, index);
    }

    pub fn page_overflow(&self) -> String {
        self.dom.body_overflow()
    }

    pub fn set_page_overflow(&mut self, value: &str) {
        self.dom.set_body_overflow(value);
    }

    pub fn navigate(&mut self, href: &str) {
        self.dom.navigate(href);
    }
}

// ─── Headless document ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryNode(usize);

#[derive(Debug, Clone, Default)]
pub struct MemoryElement {
    pub id: String,
    pub classes: BTreeSet<String>,
    pub attributes: BTreeMap<String, String>,
    pub value: String,
    pub display: Option<String>,
    pub inner_html: String,
    /// Classes on result children, keyed by position.
    pub child_classes: BTreeMap<usize, BTreeSet<String>>,
    pub scrolled_child: Option<usize>,
}

impl MemoryElement {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn child_has_class(&self, index: usize, class: &str) -> bool {
        self.child_classes
            .get(&index)
            .is_some_and(|c| c.contains(class))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDom {
    elements: Vec<MemoryElement>,
    body_overflow: String,
    focused: Option<usize>,
    navigations: Vec<String>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document containing every search anchor, with the modal hidden.
    pub fn with_search_anchors() -> Self {
        let mut dom = Self::new();
        for anchor in Anchor::ALL {
            dom.add_element(anchor.id());
        }
        if let Some(modal) = dom.element_mut(Anchor::Modal.id()) {
            modal.classes.insert(HIDDEN_CLASS.to_string());
        }
        dom
    }

    pub fn add_element(&mut self, id: &str) -> MemoryNode {
        self.elements.push(MemoryElement {
            id: id.to_string(),
            ..MemoryElement::default()
        });
        MemoryNode(self.elements.len() - 1)
    }

    pub fn remove_element(&mut self, id: &str) {
        self.elements.retain(|e| e.id != id);
    }

    pub fn element(&self, id: &str) -> Option<&MemoryElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut MemoryElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn focused_id(&self) -> Option<&str> {
        self.focused
            .and_then(|i| self.elements.get(i))
            .map(|e| e.id.as_str())
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    fn get(&self, node: &MemoryNode) -> Option<&MemoryElement> {
        self.elements.get(node.0)
    }

    fn get_mut(&mut self, node: &MemoryNode) -> Option<&mut MemoryElement> {
        self.elements.get_mut(node.0)
    }
}

impl Dom for MemoryDom {
    type Node = MemoryNode;

    fn element_by_id(&self, id: &str) -> Option<MemoryNode> {
        self.elements.iter().position(|e| e.id == id).map(MemoryNode)
    }

    fn has_class(&self, node: &MemoryNode, class: &str) -> bool {
        self.get(node).is_some_and(|e| e.has_class(class))
    }

    fn add_class(&mut self, node: &MemoryNode, class: &str) {
        if let Some(e) = self.get_mut(node) {
            e.classes.insert(class.to_string());
        }
    }

    fn remove_class(&mut self, node: &MemoryNode, class: &str) {
        if let Some(e) = self.get_mut(node) {
            e.classes.remove(class);
        }
    }

    fn set_attribute(&mut self, node: &MemoryNode, name: &str, value: &str) {
        if let Some(e) = self.get_mut(node) {
            e.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn value(&self, node: &MemoryNode) -> String {
        self.get(node).map(|e| e.value.clone()).unwrap_or_default()
    }

    fn set_value(&mut self, node: &MemoryNode, value: &str) {
        if let Some(e) = self.get_mut(node) {
            e.value = value.to_string();
        }
    }

    fn focus(&mut self, node: &MemoryNode) {
        if self.get(node).is_some() {
            self.focused = Some(node.0);
        }
    }

    fn set_display(&mut self, node: &MemoryNode, display: &str) {
        if let Some(e) = self.get_mut(node) {
            e.display = Some(display.to_string());
        }
    }

    fn set_inner_html(&mut self, node: &MemoryNode, html: String) {
        if let Some(e) = self.get_mut(node) {
            e.inner_html = html;
            e.child_classes.clear();
            e.scrolled_child = None;
        }
    }

    fn set_child_class(&mut self, node: &MemoryNode, index: usize, class: &str, on: bool) {
        if let Some(e) = self.get_mut(node) {
            let classes = e.child_classes.entry(index).or_default();
            if on {
                classes.insert(class.to_string());
            } else {
                classes.remove(class);
            }
        }
    }

    fn scroll_child_into_view(&mut self, node: &MemoryNode, index: usize) {
        if let Some(e) = self.get_mut(node) {
            e.scrolled_child = Some(index);
        }
    }

    fn body_overflow(&self) -> String {
        self.body_overflow.clone()
    }

    fn set_body_overflow(&mut self, value: &str) {
        self.body_overflow = value.to_string();
    }

    fn navigate(&mut self, href: &str) {
        self.navigations.push(href.to_string());
    }
}
