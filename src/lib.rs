//! # Site Harness
//!
//! Search, content tooling, and dynamic endpoints for a statically built blog.
//!
//! The centrepiece is the search modal controller: a debounced query box
//! over a lazily loaded static index, with keyboard navigation and a
//! stale-response guard. Around it sit the collaborators a content site
//! needs: frontmatter validation, tag and link maintenance, the RSS feed,
//! the search index build, and a rate-limited newsletter signup proxy.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────────┐
//! │ Content      │──▶│ Index build  │──▶│ search-index    │
//! │ .md / .mdx   │   │ (plain text) │   │ .json           │
//! └──────┬───────┘   └──────────────┘   └────────┬────────┘
//!        │                                        │ IndexLoader
//!        ├──▶ validate / tags / links             ▼
//!        │                              ┌─────────────────┐
//!        └──▶ RSS feed ──┐              │ SearchModal     │
//!                        ▼              │ debounce + view │
//!                  ┌──────────┐         └─────────────────┘
//!                  │   HTTP   │◀── /api/subscribe ──▶ ConvertKit
//!                  └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`content`] | Content files, frontmatter, and posts |
//! | [`debounce`] | Trailing-edge debounce |
//! | [`index`] | Search index capability and loader |
//! | [`render`] | Result markup and messages |
//! | [`view`] | Modal DOM binding |
//! | [`modal`] | Search modal controller |
//! | [`search`] | `site search` command |
//! | [`search_index`] | Search index build and check |
//! | [`validate`] | Content validation |
//! | [`tags`] | Tag taxonomy maintenance |
//! | [`links`] | Internal link rewrite and homepage link check |
//! | [`new_post`] | Draft scaffolding |
//! | [`feed`] | RSS feed |
//! | [`newsletter`] | Subscription proxy and rate limiting |
//! | [`server`] | HTTP server |

pub mod config;
pub mod content;
pub mod debounce;
pub mod feed;
pub mod index;
pub mod links;
pub mod modal;
pub mod new_post;
pub mod newsletter;
pub mod render;
pub mod search;
pub mod search_index;
pub mod server;
pub mod tags;
pub mod validate;
pub mod view;
