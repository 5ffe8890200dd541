//! Tag taxonomy: remapping fine-grained tags onto the reader-facing set.
//!
//! Posts accumulated hundreds of one-off tags over the years. `site tags
//! update` folds them onto [`CORE_TAGS`] using [`TAG_MAP`]:
//!
//! - internal `hash-` tags are kept, unchanged, at the front of the list;
//! - mapped tags are replaced by their targets (deduplicated, in first-seen
//!   order);
//! - core tags map to themselves;
//! - anything else is kept as-is after the mapped tags.
//!
//! The remap is idempotent. Running it a second time changes nothing.
//! Posts left without any visible tag get suggestions derived from the
//! slug, which are printed but never written.
//!
//! `site tags check` lists every visible tag on published posts with its
//! post count.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::config::ContentConfig;
use crate::content::{self, is_internal_tag, Post};

/// Canonical top-level tags shown to readers.
pub const CORE_TAGS: &[&str] = &[
    "productivity",
    "study-techniques",
    "learning",
    "mindset",
    "nlp",
    "health-fitness",
    "self-experiment",
    "tools",
    "newsletter",
    "podcast",
    "life-design",
    "meta",
    "deutsch",
];

/// Fine-grained tag → core tags. Tags not listed here are never changed
/// unless they are core tags already.
pub const TAG_MAP: &[(&str, &[&str])] = &[
    // Productivity
    ("productivity-boost", &["productivity"]),
    ("produktivitats-community", &["productivity"]),
    ("produktivitats-gemeinschaft", &["productivity"]),
    ("produktivitats-platzerl", &["productivity"]),
    ("time-management", &["productivity"]),
    ("time-management-2", &["productivity"]),
    ("productive-self", &["productivity"]),
    ("productivitysystem", &["productivity"]),
    ("productivity-community", &["productivity"]),
    ("focus", &["productivity"]),
    ("focus-log-ali-abdaal", &["productivity"]),
    ("focusmusic", &["productivity"]),
    ("schedule-ali-abdaal", &["productivity"]),
    // Study and learning
    ("studying", &["study-techniques"]),
    ("study", &["study-techniques"]),
    ("studytechniques", &["study-techniques"]),
    ("study-tips", &["study-techniques"]),
    ("study-hacks", &["study-techniques"]),
    ("studytips", &["study-techniques"]),
    ("studymethod", &["study-techniques"]),
    ("studyingtechnique", &["study-techniques"]),
    ("studyeffectively", &["study-techniques"]),
    ("study-problems", &["study-techniques"]),
    ("startstudying", &["study-techniques"]),
    ("start-studying", &["study-techniques"]),
    ("studying-notes", &["study-techniques"]),
    ("studying-notion", &["study-techniques"]),
    ("revision-technique", &["study-techniques"]),
    ("post-exam", &["study-techniques"]),
    ("post-exam-reflection", &["study-techniques"]),
    ("post-exam-refection-questions", &["study-techniques"]),
    ("how-to-study", &["study-techniques"]),
    ("theultimatestudyguide", &["study-techniques"]),
    ("ultimatestudyguide", &["study-techniques"]),
    ("ultimate-life-guide", &["study-techniques"]),
    ("studymethods", &["study-techniques"]),
    ("evidence-based-study-tips", &["study-techniques"]),
    ("evidence-based-study-hacks", &["study-techniques"]),
    ("active-recall-best-study-method", &["study-techniques"]),
    ("learning", &["learning"]),
    ("learning-how-to-learn", &["learning"]),
    ("metalearning", &["learning"]),
    ("a-mind-for-numbers", &["learning"]),
    ("make-it-stick", &["learning"]),
    ("remembering", &["learning"]),
    ("newinformation", &["learning"]),
    // Mindset and practical psychology
    ("practical-psychology", &["mindset"]),
    ("stress", &["mindset"]),
    ("ruminating", &["mindset"]),
    ("stop-ruminating", &["mindset"]),
    ("strategies-to-stop-ruminating", &["mindset"]),
    ("setbacks", &["mindset"]),
    ("resilience", &["mindset"]),
    ("resiliencewall", &["mindset"]),
    ("overwhelmed", &["mindset"]),
    ("procrastination", &["mindset", "productivity"]),
    ("procrastinating", &["mindset", "productivity"]),
    ("stop-procratinating", &["mindset", "productivity"]),
    ("problems-are-great-opportunities-to-learn-and-grow", &["mindset"]),
    ("effective-ruminating-strategies", &["mindset"]),
    ("self-development", &["mindset"]),
    ("selfdevelopment", &["mindset"]),
    ("personal-growth", &["mindset"]),
    ("personalgrowth", &["mindset"]),
    ("personaldevelopment", &["mindset"]),
    ("perfectionism", &["mindset"]),
    ("mindset", &["mindset"]),
    ("excellent", &["mindset"]),
    ("excellenttooutstanding", &["mindset"]),
    ("outstanding", &["mindset"]),
    ("difficult-situations", &["mindset"]),
    ("hard-times", &["mindset"]),
    ("life-advice", &["mindset"]),
    ("lifelessons", &["mindset"]),
    ("meaning-in-life", &["mindset"]),
    ("victor-frankl", &["mindset"]),
    ("philosophy", &["mindset"]),
    ("purpose", &["mindset"]),
    // NLP and coaching
    ("nlp", &["nlp"]),
    ("nlp-self-help", &["nlp"]),
    ("nlp-self-development", &["nlp"]),
    ("nlp-coach", &["nlp"]),
    ("nlp-coaching", &["nlp"]),
    ("nlpmaster", &["nlp"]),
    ("nlp-hypnosis", &["nlp"]),
    ("neuro-linguistic-programming", &["nlp"]),
    ("neuro-linguistic-programming-2", &["nlp"]),
    ("neuro-lingistic-programming", &["nlp"]),
    ("neurolinguistic-programming", &["nlp"]),
    ("self-nlp", &["nlp"]),
    ("self-coaching-tips", &["nlp"]),
    ("practical-coaching-advice", &["nlp"]),
    ("coaching", &["nlp"]),
    ("coachingtechniques", &["nlp"]),
    ("coachingmethods", &["nlp"]),
    ("hypnosis", &["nlp"]),
    ("hypnosis-tips", &["nlp"]),
    // Health and fitness
    ("healthandfitness", &["health-fitness"]),
    ("health-hacks", &["health-fitness"]),
    ("health-goals", &["health-fitness"]),
    ("measuring-health", &["health-fitness"]),
    ("measuring-health-2-0", &["health-fitness"]),
    ("measuring-health-3", &["health-fitness"]),
    ("nutrition", &["health-fitness"]),
    ("mealprep", &["health-fitness"]),
    ("skincare-bryan-johnson", &["health-fitness"]),
    ("skincare-nutrition", &["health-fitness"]),
    ("skincare-routine-blueprint-protocol", &["health-fitness"]),
    ("oral-health", &["health-fitness"]),
    ("oral-health-routine", &["health-fitness"]),
    ("oral-hygiene", &["health-fitness"]),
    ("oral-hygiene-routine", &["health-fitness"]),
    ("oral-routine", &["health-fitness"]),
    ("sports", &["health-fitness"]),
    ("running", &["health-fitness"]),
    ("running-like-forest-gump", &["health-fitness"]),
    ("ironman", &["health-fitness"]),
    ("swimming-running-cycling", &["health-fitness"]),
    ("physical-activity", &["health-fitness"]),
    ("cryotherapy", &["health-fitness"]),
    ("icespa-dusseldorf", &["health-fitness"]),
    ("meditation", &["health-fitness"]),
    ("buddhist-meditation", &["health-fitness"]),
    ("vipassana", &["health-fitness"]),
    ("vipassana-meditation", &["health-fitness"]),
    ("mental-health", &["health-fitness"]),
    ("healthier-and-happier-life", &["health-fitness"]),
    (
        "glucose-revolutionsimple-and-actionable-nutrition-hacks-i-was-amazed-by",
        &["health-fitness"],
    ),
    ("optimizing-health-my-supplement-routine-unveiled", &["health-fitness"]),
    // Self experiments and challenges
    ("self-experiment", &["self-experiment"]),
    ("31daychallenge", &["self-experiment"]),
    ("20-day-journey", &["self-experiment"]),
    ("impossible-list", &["self-experiment"]),
    ("impossible-list-example", &["self-experiment"]),
    ("impossible-list-pdf", &["self-experiment"]),
    ("impossible-list-thomas-frank", &["self-experiment"]),
    ("my-impossible-list", &["self-experiment"]),
    ("challenge-21-surfing", &["self-experiment"]),
    ("run-seat-write", &["self-experiment"]),
    ("this-weeks-adventure", &["self-experiment"]),
    ("unstress", &["self-experiment"]),
    ("daily-steps-to-self-mastery", &["self-experiment"]),
    ("ice-bathing-every-day-for-30-days", &["self-experiment", "health-fitness"]),
    // Tools and apps
    ("tech-tools", &["tools"]),
    ("notion", &["tools"]),
    ("notion-journaling", &["tools"]),
    ("best-personal-templates-notion", &["tools"]),
    ("using-notion-for-journaling", &["tools"]),
    ("shortform", &["tools"]),
    ("shortform-app", &["tools"]),
    ("shortform-book-recommendations", &["tools"]),
    ("shortform-summaries", &["tools"]),
    ("shortform-discount", &["tools"]),
    ("shortform-vs-blinkist", &["tools"]),
    ("book-summary-websites", &["tools"]),
    ("book-summaries", &["tools"]),
    ("book-summary", &["tools"]),
    ("oura-ring-gen3", &["tools"]),
    ("oura-ring-3-review", &["tools"]),
    ("gadgets", &["tools"]),
    ("ghost-cms", &["tools"]),
    ("ghost-org", &["tools"]),
    // Newsletter and podcast
    ("newsletter", &["newsletter"]),
    ("coaching-newsletter", &["newsletter"]),
    ("peak-performance-newsletter", &["newsletter"]),
    ("productivity-newsletter", &["newsletter"]),
    ("podcast", &["podcast"]),
    ("podcast-by-derek-sivers", &["podcast"]),
    ("what-is-wisdom-podcast", &["podcast"]),
    ("huberman-podcast", &["podcast"]),
    ("huberman-lab", &["podcast"]),
    // Life design, journaling, reflection
    ("journaling", &["life-design"]),
    ("journaling-framework", &["life-design"]),
    ("questions-journaling", &["life-design"]),
    ("gratitude-journal", &["life-design"]),
    ("the-toilet-thankfulness-journal", &["life-design"]),
    ("reflection", &["life-design"]),
    ("reflection-questions", &["life-design"]),
    ("weekly-review", &["life-design"]),
    ("weekly-review-workshop", &["life-design"]),
    ("weekly-review-workshop-structure", &["life-design"]),
    ("weekly-wins", &["life-design"]),
    ("planning", &["life-design"]),
    ("planning-is-everything", &["life-design"]),
    // Site
    ("about", &["meta"]),
    ("about-me-neurohackingly", &["meta"]),
    ("about-neurohackingly", &["meta"]),
    ("about-page-neurohackingly", &["meta"]),
    ("home", &["meta"]),
    ("neurohackingly", &["meta"]),
    ("topics", &["meta"]),
    ("members", &["meta"]),
    ("memberships", &["meta"]),
    ("other", &["meta"]),
    // Language
    ("deutsch", &["deutsch"]),
];

/// Slug keyword → suggested core tag. Checked in order.
const SLUG_HINTS: &[(&[&str], &str)] = &[
    (&["study", "exam", "learn"], "study-techniques"),
    (
        &["productivity", "time-management", "time-of-your-life", "routine", "focus"],
        "productivity",
    ),
    (&["nlp", "hypnosis"], "nlp"),
    (
        &[
            "meditation",
            "wim-hof",
            "ice-bathing",
            "cryo",
            "health",
            "triathlon",
            "ironman",
            "marathon",
            "skincare",
            "supplement",
        ],
        "health-fitness",
    ),
    (
        &["challenge", "impossible", "30-days", "30-day", "21-day", "21-surfing", "80-days"],
        "self-experiment",
    ),
    (&["newsletter", "weekly-review", "weekly-wins"], "newsletter"),
    (&["podcast"], "podcast"),
    (&["journal", "reflection", "review"], "life-design"),
    (&["app", "notion", "shortform", "tool", "oura-ring", "oura"], "tools"),
];

pub fn mapping_for(tag: &str) -> Option<&'static [&'static str]> {
    TAG_MAP
        .iter()
        .find(|(from, _)| *from == tag)
        .map(|(_, to)| *to)
}

pub fn is_core_tag(tag: &str) -> bool {
    CORE_TAGS.contains(&tag)
}

/// Tags split into internal `hash-` tags and visible ones, trimmed, empty
/// entries dropped.
#[derive(Debug, Default, PartialEq)]
pub struct PartitionedTags {
    pub internal: Vec<String>,
    pub visible: Vec<String>,
}

pub fn partition_tags(tags: &[String]) -> PartitionedTags {
    let mut out = PartitionedTags::default();
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if is_internal_tag(tag) {
            out.internal.push(tag.to_string());
        } else {
            out.visible.push(tag.to_string());
        }
    }
    out
}

#[derive(Debug, Default, PartialEq)]
pub struct MappedTags {
    pub mapped: Vec<String>,
    pub unmapped: Vec<String>,
}

pub fn map_visible_tags(visible: &[String]) -> MappedTags {
    let mut out = MappedTags::default();
    for tag in visible.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        match mapping_for(tag) {
            Some(targets) if !targets.is_empty() => {
                for target in targets {
                    push_unique(&mut out.mapped, target);
                }
            }
            _ if is_core_tag(tag) => push_unique(&mut out.mapped, tag),
            _ => out.unmapped.push(tag.to_string()),
        }
    }
    out
}

fn push_unique(list: &mut Vec<String>, tag: &str) {
    if !list.iter().any(|t| t == tag) {
        list.push(tag.to_string());
    }
}

pub fn suggest_tags_from_slug(slug: &str) -> Vec<&'static str> {
    let slug = slug.to_lowercase();
    let mut out = Vec::new();
    for (keywords, tag) in SLUG_HINTS {
        if keywords.iter().any(|k| slug.contains(k)) && !out.contains(tag) {
            out.push(*tag);
        }
    }
    out
}

/// Planned tag change for one post.
#[derive(Debug, Clone)]
pub struct TagUpdate {
    pub file: PathBuf,
    pub slug: String,
    pub internal: Vec<String>,
    pub old_visible: Vec<String>,
    pub new_visible: Vec<String>,
    pub unmapped: Vec<String>,
    pub suggestions: Vec<&'static str>,
    pub changed: bool,
}

impl TagUpdate {
    pub fn for_post(post: &Post) -> Self {
        let current = raw_tags(post.data.get("tags"));
        let PartitionedTags { internal, visible } = partition_tags(&current);
        let MappedTags { mapped, unmapped } = map_visible_tags(&visible);

        let mut new_visible = mapped;
        new_visible.extend(unmapped.iter().cloned());

        let suggestions = if visible.is_empty() && new_visible.is_empty() {
            suggest_tags_from_slug(&post.slug)
        } else {
            Vec::new()
        };

        let mut update = Self {
            file: post.path.clone(),
            slug: post.slug.clone(),
            internal,
            old_visible: visible,
            new_visible,
            unmapped,
            suggestions,
            changed: false,
        };
        update.changed = current != update.new_tags();
        update
    }

    /// Full tag list to write: internal tags first, then visible ones.
    pub fn new_tags(&self) -> Vec<String> {
        self.internal
            .iter()
            .chain(self.new_visible.iter())
            .cloned()
            .collect()
    }

    pub fn has_no_visible_tags(&self) -> bool {
        self.old_visible.is_empty() && self.new_visible.is_empty()
    }
}

/// Tags as written, without trimming, so whitespace differences count as
/// changes.
fn raw_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Replaces the top-level `tags` entry of the frontmatter in `source` with
/// a block list of `tags`, leaving every other line untouched. Adds the
/// entry when absent.
pub fn set_frontmatter_tags(source: &str, tags: &[String]) -> Result<String> {
    let Some((yaml, _)) = content::split_frontmatter(source) else {
        bail!("file has no frontmatter block");
    };
    let start = yaml.as_ptr() as usize - source.as_ptr() as usize;
    let end = start + yaml.len();
    let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };

    let mut block = String::new();
    if tags.is_empty() {
        block.push_str("tags: []");
        block.push_str(newline);
    } else {
        block.push_str("tags:");
        block.push_str(newline);
        for tag in tags {
            block.push_str("  - ");
            block.push_str(&yaml_scalar(tag));
            block.push_str(newline);
        }
    }

    let mut out = String::with_capacity(source.len() + block.len());
    out.push_str(&source[..start]);

    let mut replaced = false;
    let mut in_tags = false;
    for line in yaml.split_inclusive('\n') {
        if in_tags {
            if line.starts_with([' ', '\t', '-']) {
                continue;
            }
            in_tags = false;
        }
        if !replaced && (line.starts_with("tags:") || line.starts_with("tags :")) {
            out.push_str(&block);
            replaced = true;
            in_tags = true;
            continue;
        }
        out.push_str(line);
    }
    if !replaced {
        if !yaml.is_empty() && !yaml.ends_with('\n') {
            out.push_str(newline);
        }
        out.push_str(&block);
    }

    out.push_str(&source[end..]);
    Ok(out)
}

/// Plain YAML scalar when unambiguous, double-quoted otherwise.
fn yaml_scalar(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
        && value.starts_with(|c: char| c.is_alphabetic())
        && !value.ends_with(' ')
        && !matches!(
            value.to_lowercase().as_str(),
            "true" | "false" | "yes" | "no" | "on" | "off" | "null" | "y" | "n"
        );
    if plain {
        value.to_string()
    } else {
        serde_json::Value::String(value.to_string()).to_string()
    }
}

fn join_or_none(items: &[impl AsRef<str>]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
    }
}

/// `site tags update`: prints the planned remap (dry run) or applies it.
pub fn run_tags_update(config: &ContentConfig, write: bool, filter: Option<&str>) -> Result<()> {
    let updates: Vec<TagUpdate> = content::load_posts(config)?
        .iter()
        .filter(|p| filter.map_or(true, |f| p.slug.contains(f)))
        .map(TagUpdate::for_post)
        .collect();

    let changed = updates.iter().filter(|u| u.changed).count();
    let empty = updates.iter().filter(|u| u.has_no_visible_tags()).count();

    if !write {
        println!("Tag update dry run");
        println!();
        for u in &updates {
            if u.has_no_visible_tags() && u.suggestions.is_empty() {
                continue;
            }
            println!("• {}", u.file.display());
            println!("  slug: {}", u.slug);
            println!("  hash tags: {}", join_or_none(&u.internal));
            println!("  visible tags: {}", join_or_none(&u.old_visible));
            println!("  -> new visible: {}", join_or_none(&u.new_visible));
            if !u.unmapped.is_empty() {
                println!("  unmapped (kept as-is): {}", u.unmapped.join(", "));
            }
            if !u.suggestions.is_empty() {
                println!("  suggestions for empty tags: {}", u.suggestions.join(", "));
            }
            println!();
        }
        println!("Summary:");
        println!("  Files scanned: {}", updates.len());
        println!("  Files with tag changes (if --write): {}", changed);
        println!("  Files with no visible tags: {}", empty);
        return Ok(());
    }

    let mut updated = 0;
    for u in updates.iter().filter(|u| u.changed) {
        let source = std::fs::read_to_string(&u.file)
            .with_context(|| format!("Failed to read {}", u.file.display()))?;
        let next = set_frontmatter_tags(&source, &u.new_tags())
            .with_context(|| format!("Failed to update tags in {}", u.file.display()))?;
        std::fs::write(&u.file, next)
            .with_context(|| format!("Failed to write {}", u.file.display()))?;
        tracing::debug!(file = %u.file.display(), tags = ?u.new_tags(), "tags rewritten");
        println!("✅ Updated tags in {}", u.file.display());
        updated += 1;
    }

    println!();
    println!(
        "Done. Updated {} file{}.",
        updated,
        if updated == 1 { "" } else { "s" }
    );
    Ok(())
}

/// Visible tag → slugs of the published posts carrying it, sorted by tag.
pub fn tag_usage(posts: &[Post]) -> BTreeMap<String, Vec<String>> {
    let mut usage: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for post in posts.iter().filter(|p| !p.is_draft()) {
        for tag in post.visible_tags() {
            usage.entry(tag).or_default().push(post.slug.clone());
        }
    }
    usage
}

/// `site tags check`: prints the tag overview. Returns `false` when no
/// post carries a visible tag.
pub fn run_tags_check(config: &ContentConfig) -> Result<bool> {
    let posts = content::load_posts(config)?;
    let usage = tag_usage(&posts);

    println!("Tag usage overview");
    println!();
    for (tag, slugs) in &usage {
        println!("{}: {} post(s)", tag, slugs.len());
    }

    let tagged: std::collections::BTreeSet<&String> = usage.values().flatten().collect();
    println!();
    println!("Summary:");
    println!("  Tags: {}", usage.len());
    println!("  Posts with tags: {}", tagged.len());

    if usage.is_empty() {
        eprintln!();
        eprintln!("❌ No tags found. Did you forget to add tags to posts?");
        return Ok(false);
    }

    println!();
    println!("✅ Tag validation completed.");
    Ok(true)
}
