//! Search modal controller.
//!
//! [`SearchModal`] owns the interaction state of the search widget and
//! drives a [`ModalView`]. Events arrive through [`SearchModal::dispatch`];
//! typing is debounced, queries run against the index obtained from an
//! [`IndexLoader`], and the rendered outcome is written back to the view.
//!
//! ```text
//!            trigger / Cmd+K
//!   Closed ──────────────────▶ Hint ◀──────── query < 2 chars
//!     ▲                         │ input ≥ 2 chars (after 300 ms quiet)
//!     │ Esc / close / backdrop  ▼
//!     └──────────────────── Loading ──▶ Results(selection) | Error
//! ```
//!
//! Every search takes a sequence number. Only the most recent request may
//! render or hide the loading indicator, so a slow response that settles
//! after a newer query started is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;

use crate::config::SearchConfig;
use crate::debounce::Debouncer;
use crate::index::IndexLoader;
use crate::render::{error_pane, render_results, ResultsPane};
use crate::view::{Dom, ModalView, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    ArrowUp,
    ArrowDown,
    Enter,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Cmd on macOS.
    pub meta: bool,
    pub ctrl: bool,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            meta: false,
            ctrl: false,
        }
    }

    pub fn meta(key: Key) -> Self {
        Self {
            key,
            meta: true,
            ctrl: false,
        }
    }

    pub fn ctrl(key: Key) -> Self {
        Self {
            key,
            meta: false,
            ctrl: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalEvent {
    TriggerClick,
    CloseClick,
    BackdropClick,
    KeyDown(KeyEvent),
    /// New value of the search input.
    Input(String),
    /// Pointer moved over a result; carries that element's `data-index`.
    ResultHover(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Closed,
    Hint,
    Loading,
    Results { selected: Option<usize> },
    Error,
}

/// What the event source should do after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not consumed.
    Ignored,
    Handled,
    /// Consumed; the default browser action must be suppressed.
    PreventDefault,
}

#[derive(Debug, Clone, Copy)]
pub struct ModalOptions {
    pub debounce: Duration,
    pub max_results: usize,
    pub min_query_len: usize,
}

impl Default for ModalOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            max_results: 10,
            min_query_len: 2,
        }
    }
}

impl From<&SearchConfig> for ModalOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            max_results: config.max_results,
            min_query_len: config.min_query_len,
        }
    }
}

struct Shared<D: Dom> {
    view: ModalView<D>,
    pane: ResultsPane,
    selected: Option<usize>,
    loading: bool,
    saved_overflow: String,
}

struct Inner<D: Dom> {
    shared: Mutex<Shared<D>>,
    loader: IndexLoader,
    options: ModalOptions,
    active: AtomicBool,
    latest_request: AtomicU64,
}

pub struct SearchModal<D: Dom> {
    inner: Arc<Inner<D>>,
    debouncer: Debouncer<String>,
}

impl<D: Dom> SearchModal<D> {
    /// Binds the modal to `dom`. Fails without side effects if any
    /// required anchor is missing.
    pub fn new(dom: D, loader: IndexLoader, options: ModalOptions) -> Result<Self, ViewError> {
        let view = ModalView::bind(dom)?;

        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                view,
                pane: ResultsPane::Hint,
                selected: None,
                loading: false,
                saved_overflow: String::new(),
            }),
            loader,
            options,
            active: AtomicBool::new(true),
            latest_request: AtomicU64::new(0),
        });

        let weak: Weak<Inner<D>> = Arc::downgrade(&inner);
        let debouncer = Debouncer::new(options.debounce, move |query: String| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.run_query(&query).await;
                }
            }
            .boxed()
        });

        inner.show_hint();
        Ok(Self { inner, debouncer })
    }

    pub fn dispatch(&self, event: ModalEvent) -> Dispatch {
        if !self.inner.is_active() {
            return Dispatch::Ignored;
        }

        match event {
            ModalEvent::TriggerClick => {
                self.inner.open();
                Dispatch::Handled
            }
            ModalEvent::CloseClick | ModalEvent::BackdropClick => {
                self.inner.close();
                Dispatch::Handled
            }
            ModalEvent::KeyDown(key) => self.inner.handle_keydown(key),
            ModalEvent::Input(value) => {
                self.inner.lock().view.set_input_value(&value);
                self.debouncer.call(value);
                Dispatch::Handled
            }
            ModalEvent::ResultHover(index) => {
                if self.inner.handle_hover(index.as_deref()) {
                    Dispatch::Handled
                } else {
                    Dispatch::Ignored
                }
            }
        }
    }

    /// Runs `query` immediately, bypassing the debounce.
    pub async fn search_now(&self, query: &str) {
        self.inner.run_query(query).await;
    }

    pub fn state(&self) -> ModalState {
        let shared = self.inner.lock();
        if !shared.view.is_open() {
            return ModalState::Closed;
        }
        if shared.loading {
            return ModalState::Loading;
        }
        match shared.pane {
            ResultsPane::Hint => ModalState::Hint,
            ResultsPane::Results(_) | ResultsPane::NoResults => ModalState::Results {
                selected: shared.selected,
            },
            ResultsPane::Error(_) => ModalState::Error,
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.inner.lock().selected
    }

    pub fn pane(&self) -> ResultsPane {
        self.inner.lock().pane.clone()
    }

    pub fn with_view<R>(&self, f: impl FnOnce(&ModalView<D>) -> R) -> R {
        f(&self.inner.lock().view)
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Unbinds every listener, cancels the pending debounced query, and
    /// forces the modal closed. Safe to call more than once.
    pub fn destroy(&self) {
        if !self.inner.is_active() {
            return;
        }
        self.inner.close();
        self.debouncer.cancel();
        {
            let mut shared = self.inner.lock();
            self.inner.active.store(false, Ordering::SeqCst);
            self.inner.invalidate(&mut shared);
        }
        tracing::debug!("search modal torn down");
    }
}

impl<D: Dom> Drop for SearchModal<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Hides the loading indicator when a search settles, on every exit path,
/// provided the search is still the latest one.
struct LoadingGuard<'a, D: Dom> {
    inner: &'a Inner<D>,
    seq: u64,
}

impl<D: Dom> Drop for LoadingGuard<'_, D> {
    fn drop(&mut self) {
        let mut shared = self.inner.lock();
        if self.inner.is_current(self.seq) {
            shared.loading = false;
            shared.view.set_loading(false);
        }
    }
}

impl<D: Dom> Inner<D> {
    fn lock(&self) -> MutexGuard<'_, Shared<D>> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_current(&self, seq: u64) -> bool {
        self.is_active() && self.latest_request.load(Ordering::SeqCst) == seq
    }

    /// Supersedes any in-flight search and hides its loading indicator.
    fn invalidate(&self, shared: &mut Shared<D>) {
        self.latest_request.fetch_add(1, Ordering::SeqCst);
        if shared.loading {
            shared.loading = false;
            shared.view.set_loading(false);
        }
    }

    fn set_pane(shared: &mut Shared<D>, pane: ResultsPane) {
        shared.view.render(&pane);
        shared.pane = pane;
        shared.selected = None;
    }

    fn show_hint(&self) {
        let mut shared = self.lock();
        self.invalidate(&mut shared);
        Self::set_pane(&mut shared, ResultsPane::Hint);
    }

    fn open(&self) {
        if !self.is_active() {
            return;
        }
        let mut shared = self.lock();
        let was_hidden = !shared.view.is_open();
        shared.view.show();
        if was_hidden {
            shared.saved_overflow = shared.view.page_overflow();
            shared.view.set_page_overflow("hidden");
        }
        shared.view.focus_input();
    }

    fn close(&self) {
        if !self.is_active() {
            return;
        }
        let mut shared = self.lock();
        let was_open = shared.view.is_open();
        shared.view.hide();
        if was_open {
            let saved = std::mem::take(&mut shared.saved_overflow);
            shared.view.set_page_overflow(&saved);
        }
        shared.view.set_input_value("");
        self.invalidate(&mut shared);
        Self::set_pane(&mut shared, ResultsPane::Hint);
    }

    fn handle_keydown(&self, event: KeyEvent) -> Dispatch {
        if (event.meta || event.ctrl) && event.key == Key::Char('k') {
            self.open();
            return Dispatch::PreventDefault;
        }

        let (open, has_selection) = {
            let shared = self.lock();
            (shared.view.is_open(), shared.selected.is_some())
        };
        if event.key == Key::Escape && open {
            self.close();
            return Dispatch::Handled;
        }
        if !open {
            return Dispatch::Ignored;
        }

        match event.key {
            Key::ArrowDown => {
                self.navigate(1);
                Dispatch::PreventDefault
            }
            Key::ArrowUp => {
                self.navigate(-1);
                Dispatch::PreventDefault
            }
            Key::Enter if has_selection => {
                self.select_result();
                Dispatch::PreventDefault
            }
            _ => Dispatch::Ignored,
        }
    }

    fn navigate(&self, direction: i64) {
        let mut shared = self.lock();
        let count = if shared.loading {
            0
        } else {
            shared.pane.result_count()
        };
        if count == 0 {
            return;
        }

        let n = count as i64;
        let current = shared.selected.map_or(-1, |s| s as i64);
        let mut next = current + direction;
        if next < 0 {
            next = n - 1;
        } else if next >= n {
            next = 0;
        }
        let next = next as usize;

        shared.selected = Some(next);
        shared.view.mark_selected(count, Some(next));
        shared.view.scroll_into_view(next);
    }

    fn select_result(&self) {
        let mut shared = self.lock();
        let href = shared
            .selected
            .and_then(|i| shared.pane.href(i))
            .map(str::to_string);
        if let Some(href) = href {
            tracing::debug!(%href, "navigating to search result");
            shared.view.navigate(&href);
        }
    }

    fn handle_hover(&self, index: Option<&str>) -> bool {
        let Some(index) = index.and_then(|raw| raw.trim().parse::<usize>().ok()) else {
            return false;
        };
        let mut shared = self.lock();
        let count = shared.pane.result_count();
        if shared.loading || index >= count {
            return false;
        }
        shared.selected = Some(index);
        shared.view.mark_selected(count, Some(index));
        true
    }

    async fn run_query(&self, raw: &str) {
        if !self.is_active() {
            return;
        }
        let query = raw.trim();
        if query.chars().count() < self.options.min_query_len {
            self.show_hint();
            return;
        }
        self.perform_search(query).await;
    }

    async fn perform_search(&self, query: &str) {
        // Sequence and loading state change under the lock; close and destroy
        // invalidate under the same lock.
        let seq = {
            let mut shared = self.lock();
            if !self.is_active() {
                return;
            }
            let seq = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
            shared.loading = true;
            shared.view.set_loading(true);
            Self::set_pane(&mut shared, ResultsPane::Results(Vec::new()));
            seq
        };
        let _loading = LoadingGuard { inner: self, seq };

        let outcome = self.loader.query(query, self.options.max_results).await;

        let mut shared = self.lock();
        if !self.is_current(seq) {
            tracing::debug!(query, "discarding results of superseded search");
            return;
        }
        let pane = match outcome {
            Ok(records) => render_results(&records),
            Err(e) => {
                tracing::error!(error = %e, query, "search failed");
                error_pane(&e)
            }
        };
        Self::set_pane(&mut shared, pane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{MemoryIndex, MemorySource};
    use crate::index::{RankingOptions, ResultRecord};
    use crate::render::{ASSET_MISSING_TEXT, SEARCH_FAILED_TEXT};
    use crate::view::MemoryDom;

    fn record(title: &str, url: &str) -> ResultRecord {
        ResultRecord {
            url: url.to_string(),
            title: title.to_string(),
            excerpt: format!("About <mark>{}</mark>", title),
            tags: Some("productivity, focus".to_string()),
            date: Some("2024-01-05T12:00:00.000Z".to_string()),
            word_count: 500,
        }
    }

    fn deep_records() -> Vec<ResultRecord> {
        vec![
            record("Deep Work", "/deep-work/"),
            record("Deep Sleep", "/deep-sleep/"),
            record("Deep Focus", "/deep-focus/"),
        ]
    }

    struct Fixture {
        modal: SearchModal<MemoryDom>,
        index: Arc<MemoryIndex>,
        source: Arc<MemorySource>,
    }

    fn fixture_with(records: Vec<ResultRecord>, available: bool) -> Fixture {
        let index = Arc::new(MemoryIndex::new(records));
        let source = Arc::new(if available {
            MemorySource::new(index.clone())
        } else {
            MemorySource::missing(index.clone())
        });
        let loader = IndexLoader::new(source.clone(), RankingOptions::default());
        let mut dom = MemoryDom::with_search_anchors();
        dom.set_body_overflow("scroll");
        let modal = SearchModal::new(dom, loader, ModalOptions::default()).unwrap();
        Fixture {
            modal,
            index,
            source,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(deep_records(), true)
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    async fn type_query(modal: &SearchModal<MemoryDom>, text: &str) {
        modal.dispatch(ModalEvent::Input(text.to_string()));
        tokio::time::advance(Duration::from_millis(301)).await;
        settle().await;
    }

    fn results_html(modal: &SearchModal<MemoryDom>) -> String {
        modal.with_view(|v| v.dom().element("search-results").unwrap().inner_html.clone())
    }

    fn loading_display(modal: &SearchModal<MemoryDom>) -> Option<String> {
        modal.with_view(|v| v.dom().element("search-loading").unwrap().display.clone())
    }

    #[test]
    fn test_construction_fails_without_anchors() {
        let mut dom = MemoryDom::with_search_anchors();
        dom.remove_element("search-close");
        let index = Arc::new(MemoryIndex::new(vec![]));
        let loader = IndexLoader::new(
            Arc::new(MemorySource::new(index)),
            RankingOptions::default(),
        );
        let err = SearchModal::new(dom, loader, ModalOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("#search-close"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_closed_with_hint() {
        let f = fixture();
        assert_eq!(f.modal.state(), ModalState::Closed);
        assert!(results_html(&f.modal).contains("search-hint"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_opens_and_locks_scroll() {
        let f = fixture();
        assert_eq!(f.modal.dispatch(ModalEvent::TriggerClick), Dispatch::Handled);
        assert_eq!(f.modal.state(), ModalState::Hint);
        f.modal.with_view(|v| {
            let dom = v.dom();
            assert!(!dom.element("search-modal").unwrap().has_class("hidden"));
            assert_eq!(
                dom.element("search-input").unwrap().attributes["aria-expanded"],
                "true"
            );
            assert_eq!(dom.body_overflow(), "hidden");
            assert_eq!(dom.focused_id(), Some("search-input"));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortcut_opens_with_either_modifier() {
        let f = fixture();
        let d = f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::meta(Key::Char('k'))));
        assert_eq!(d, Dispatch::PreventDefault);
        assert_eq!(f.modal.state(), ModalState::Hint);

        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::Escape)));
        assert_eq!(f.modal.state(), ModalState::Closed);

        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::ctrl(Key::Char('k'))));
        assert_eq!(f.modal.state(), ModalState::Hint);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopening_does_not_overwrite_saved_overflow() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::meta(Key::Char('k'))));
        f.modal.dispatch(ModalEvent::CloseClick);
        f.modal.with_view(|v| assert_eq!(v.dom().body_overflow(), "scroll"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_k_is_ignored_when_closed() {
        let f = fixture();
        let d = f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::Char('k'))));
        assert_eq!(d, Dispatch::Ignored);
        assert_eq!(f.modal.state(), ModalState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_resets_everything() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowDown)));
        assert_eq!(f.modal.selected(), Some(0));

        f.modal.dispatch(ModalEvent::BackdropClick);

        assert_eq!(f.modal.state(), ModalState::Closed);
        assert_eq!(f.modal.selected(), None);
        assert_eq!(f.modal.pane(), ResultsPane::Hint);
        f.modal.with_view(|v| {
            assert_eq!(v.input_value(), "");
            assert_eq!(v.dom().body_overflow(), "scroll");
            assert!(v.dom().element("search-modal").unwrap().has_class("hidden"));
        });
        assert!(results_html(&f.modal).contains("search-hint"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escape_ignored_while_closed() {
        let f = fixture();
        let d = f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::Escape)));
        assert_eq!(d, Dispatch::Ignored);
        f.modal.with_view(|v| assert_eq!(v.dom().body_overflow(), "scroll"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_queries_show_hint_and_never_search() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        for q in ["", " ", "d", " d "] {
            type_query(&f.modal, q).await;
            assert_eq!(f.modal.state(), ModalState::Hint);
        }
        assert!(f.index.queries().is_empty());
        assert_eq!(f.source.open_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_issues_single_search() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        for q in ["de", "dee", "deep"] {
            f.modal.dispatch(ModalEvent::Input(q.to_string()));
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        tokio::time::advance(Duration::from_millis(301)).await;
        settle().await;

        assert_eq!(f.index.queries(), vec!["deep".to_string()]);
        assert_eq!(f.modal.state(), ModalState::Results { selected: None });
        assert_eq!(f.modal.pane().result_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_is_trimmed() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "  deep  ").await;
        assert_eq!(f.index.queries(), vec!["deep".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrow_navigation_wraps_both_ways() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;

        let up = ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowUp));
        let down = ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowDown));

        assert_eq!(f.modal.dispatch(up.clone()), Dispatch::PreventDefault);
        assert_eq!(f.modal.selected(), Some(2));
        f.modal.dispatch(down.clone());
        assert_eq!(f.modal.selected(), Some(0));
        f.modal.dispatch(up.clone());
        assert_eq!(f.modal.selected(), Some(2));
        f.modal.dispatch(down.clone());
        f.modal.dispatch(down.clone());
        assert_eq!(f.modal.selected(), Some(1));

        f.modal.with_view(|v| {
            let results = v.dom().element("search-results").unwrap();
            assert!(results.child_has_class(1, "selected"));
            assert!(!results.child_has_class(0, "selected"));
            assert!(!results.child_has_class(2, "selected"));
            assert_eq!(results.scrolled_child, Some(1));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_without_results_is_noop() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowDown)));
        assert_eq!(f.modal.selected(), None);

        type_query(&f.modal, "nothing matches").await;
        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowDown)));
        assert_eq!(f.modal.selected(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_navigates_to_selected_result() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;

        let enter = ModalEvent::KeyDown(KeyEvent::plain(Key::Enter));
        assert_eq!(f.modal.dispatch(enter.clone()), Dispatch::Ignored);
        f.modal.with_view(|v| assert!(v.dom().navigations().is_empty()));

        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowDown)));
        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowDown)));
        assert_eq!(f.modal.dispatch(enter), Dispatch::PreventDefault);
        f.modal.with_view(|v| {
            assert_eq!(v.dom().navigations(), &["/deep-sleep/".to_string()])
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_hover_updates_selection() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;

        f.modal.dispatch(ModalEvent::ResultHover(Some("2".to_string())));
        assert_eq!(f.modal.selected(), Some(2));
        f.modal.with_view(|v| {
            assert_eq!(v.dom().focused_id(), Some("search-input"));
            assert!(v
                .dom()
                .element("search-results")
                .unwrap()
                .child_has_class(2, "selected"));
        });

        for bad in [None, Some("x"), Some("7")] {
            let d = f
                .modal
                .dispatch(ModalEvent::ResultHover(bad.map(str::to_string)));
            assert_eq!(d, Dispatch::Ignored);
            assert_eq!(f.modal.selected(), Some(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_redraw_resets_selection() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        f.modal.dispatch(ModalEvent::KeyDown(KeyEvent::plain(Key::ArrowUp)));
        assert_eq!(f.modal.selected(), Some(2));

        type_query(&f.modal, "deep work").await;
        assert_eq!(f.modal.selected(), None);
        assert_eq!(f.modal.pane().result_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_results_renders_placeholder() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "zebra").await;
        assert_eq!(f.modal.pane(), ResultsPane::NoResults);
        let html = results_html(&f.modal);
        assert!(html.contains("search-no-results"));
        assert!(!html.contains("class=\"search-result\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_capped_at_max() {
        let records: Vec<ResultRecord> = (0..15)
            .map(|i| record(&format!("Deep {}", i), &format!("/deep-{}/", i)))
            .collect();
        let f = fixture_with(records, true);
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        assert_eq!(f.modal.pane().result_count(), 10);
        assert_eq!(f.index.data_calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_asset_missing_message_then_recovers() {
        let f = fixture_with(deep_records(), false);
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;

        assert_eq!(f.modal.state(), ModalState::Error);
        assert_eq!(
            f.modal.pane(),
            ResultsPane::Error(ASSET_MISSING_TEXT.to_string())
        );
        assert_eq!(loading_display(&f.modal).as_deref(), Some("none"));

        f.source.set_available(true);
        type_query(&f.modal, "deep sleep").await;
        assert_eq!(f.modal.pane().result_count(), 1);
        assert_eq!(f.source.open_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failure_message() {
        let f = fixture();
        f.index.fail_searches(true);
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        assert_eq!(
            f.modal.pane(),
            ResultsPane::Error(SEARCH_FAILED_TEXT.to_string())
        );
        assert_eq!(loading_display(&f.modal).as_deref(), Some("none"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_hit_resolution_fails_whole_batch() {
        let f = fixture();
        f.index.fail_data(true);
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        assert_eq!(f.modal.state(), ModalState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_indicator_while_in_flight() {
        let f = fixture();
        f.index.delay_query("deep", Duration::from_secs(2));
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;

        assert_eq!(f.modal.state(), ModalState::Loading);
        assert_eq!(loading_display(&f.modal).as_deref(), Some("block"));
        assert_eq!(results_html(&f.modal), "");

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(f.modal.state(), ModalState::Results { selected: None });
        assert_eq!(loading_display(&f.modal).as_deref(), Some("none"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_render_once_every_record_resolves() {
        let f = fixture();
        f.index.delay_data(Duration::from_millis(100));
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;

        tokio::time::advance(Duration::from_millis(99)).await;
        settle().await;
        assert_eq!(f.modal.state(), ModalState::Loading);
        assert_eq!(results_html(&f.modal), "");
        assert_eq!(f.index.data_calls(), 3);

        // Three records at 100ms each land together, not after 300ms.
        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(f.modal.state(), ModalState::Results { selected: None });
        assert_eq!(f.modal.pane().result_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let f = fixture();
        f.index.delay_query("deep", Duration::from_secs(2));
        f.modal.dispatch(ModalEvent::TriggerClick);

        type_query(&f.modal, "deep").await;
        type_query(&f.modal, "deep focus").await;
        assert_eq!(f.modal.pane().href(0), Some("/deep-focus/"));
        assert_eq!(f.modal.pane().result_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(f.index.queries(), vec!["deep", "deep focus"]);
        assert_eq!(f.modal.pane().result_count(), 1);
        assert_eq!(loading_display(&f.modal).as_deref(), Some("none"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_query_drops_in_flight_results() {
        let f = fixture();
        f.index.delay_query("deep", Duration::from_secs(2));
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        type_query(&f.modal, "").await;
        assert_eq!(f.modal.state(), ModalState::Hint);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(f.modal.state(), ModalState::Hint);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rendered_markup_is_sanitized() {
        let hostile = ResultRecord {
            url: "/x/".to_string(),
            title: "<img src=x onerror=alert(1)>Title".to_string(),
            excerpt: "safe <strong>bold</strong><script>alert('x')</script>".to_string(),
            tags: None,
            date: None,
            word_count: 3,
        };
        let f = fixture_with(vec![hostile], true);
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "title").await;

        let html = results_html(&f.modal);
        assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;Title"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_is_idempotent_and_stops_handling() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        f.modal.dispatch(ModalEvent::Input("deep".to_string()));

        f.modal.destroy();
        f.modal.destroy();
        assert!(!f.modal.is_active());
        assert_eq!(f.modal.state(), ModalState::Closed);
        f.modal.with_view(|v| assert_eq!(v.dom().body_overflow(), "scroll"));

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(f.index.queries().is_empty());

        for event in [
            ModalEvent::TriggerClick,
            ModalEvent::KeyDown(KeyEvent::meta(Key::Char('k'))),
            ModalEvent::Input("deep".to_string()),
            ModalEvent::ResultHover(Some("0".to_string())),
        ] {
            assert_eq!(f.modal.dispatch(event), Dispatch::Ignored);
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(f.modal.state(), ModalState::Closed);
        assert!(f.index.queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_discards_in_flight_search() {
        let f = fixture();
        f.index.delay_query("deep", Duration::from_secs(2));
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        f.modal.destroy();

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(f.modal.pane(), ResultsPane::Hint);
        assert_eq!(loading_display(&f.modal).as_deref(), Some("none"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_starting_after_destroy_leaves_no_loader() {
        let f = fixture();
        f.modal.dispatch(ModalEvent::TriggerClick);
        f.modal.destroy();

        // A query that passed its activity check just before teardown.
        f.modal.inner.perform_search("deep").await;
        assert_eq!(f.modal.state(), ModalState::Closed);
        assert_eq!(f.modal.pane(), ResultsPane::Hint);
        assert_ne!(loading_display(&f.modal).as_deref(), Some("block"));
        assert!(f.index.queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_mid_search_hides_loader_for_good() {
        let f = fixture();
        f.index.delay_query("deep", Duration::from_secs(2));
        f.modal.dispatch(ModalEvent::TriggerClick);
        type_query(&f.modal, "deep").await;
        assert_eq!(loading_display(&f.modal).as_deref(), Some("block"));

        f.modal.dispatch(ModalEvent::CloseClick);
        assert_eq!(loading_display(&f.modal).as_deref(), Some("none"));

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(f.modal.state(), ModalState::Closed);
        assert_eq!(f.modal.pane(), ResultsPane::Hint);
        assert_eq!(loading_display(&f.modal).as_deref(), Some("none"));
    }

    #[tokio::test]
    async fn test_search_now_bypasses_debounce() {
        let f = fixture();
        f.modal.search_now("deep").await;
        assert_eq!(f.modal.pane().result_count(), 3);
    }
}
