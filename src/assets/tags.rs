//! Asset tag parsing.
//!
//! Third-party asset packs name their folders loosely (`Happy/Touch_Head/A_Start`,
//! `nomal`, `idel`, ...). A path is split into lowercase tags and each
//! category consumes the tags it recognizes, in order: state, activity,
//! transition, then name. A tag consumed by one category is never seen by
//! the next.
//!
//! # Example
//!
//! ```
//! use deskpet::assets::{parse_asset_path, Activity, ParseContext, PetState, Transition};
//! use std::path::Path;
//!
//! let ctx = ParseContext::new("/pack");
//! let key = parse_asset_path(Path::new("/pack/happy_touch_head_start_0"), &ctx).unwrap();
//! assert_eq!(key.state, PetState::Happy);
//! assert_eq!(key.activity, Activity::TouchHead);
//! assert_eq!(key.transition, Transition::Start);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::hash::path_hash;

/// Mood/health state an animation is authored for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PetState {
    Happy,
    #[default]
    Normal,
    Bad,
    Ill,
}

impl PetState {
    pub const ALL: [PetState; 4] = [PetState::Happy, PetState::Normal, PetState::Bad, PetState::Ill];
}

impl fmt::Display for PetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Categorical purpose of an animation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
pub enum Activity {
    #[default]
    Unknown,
    RaisedDynamic,
    RaisedStatic,
    Move,
    CommonIdle,
    TouchHead,
    TouchBody,
    Idle,
    Idle1,
    Idle2,
    Sleep,
    Say,
    Startup,
    Shutdown,
    Work,
    SwitchUp,
    SwitchDown,
    SwitchThirsty,
    SwitchHunger,
}

impl Activity {
    /// Lowercase identifier used when a name has to be synthesized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Unknown => "unknown",
            Activity::RaisedDynamic => "raiseddynamic",
            Activity::RaisedStatic => "raisedstatic",
            Activity::Move => "move",
            Activity::CommonIdle => "commonidle",
            Activity::TouchHead => "touchhead",
            Activity::TouchBody => "touchbody",
            Activity::Idle => "idle",
            Activity::Idle1 => "idle1",
            Activity::Idle2 => "idle2",
            Activity::Sleep => "sleep",
            Activity::Say => "say",
            Activity::Startup => "startup",
            Activity::Shutdown => "shutdown",
            Activity::Work => "work",
            Activity::SwitchUp => "switchup",
            Activity::SwitchDown => "switchdown",
            Activity::SwitchThirsty => "switchthirsty",
            Activity::SwitchHunger => "switchhunger",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which part of a multi-phase animation a sequence represents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Start,
    Loop,
    End,
    #[default]
    Single,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured identity of one animation folder.
///
/// All fields take part in equality, so two folders that only differ by
/// location still produce distinct keys through `source_path_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnimationKey {
    pub name: String,
    pub activity: Activity,
    pub state: PetState,
    pub transition: Transition,
    pub source_path_hash: u64,
}

impl AnimationKey {
    pub fn new(
        name: impl Into<String>,
        activity: Activity,
        state: PetState,
        transition: Transition,
        source_path_hash: u64,
    ) -> Self {
        Self {
            name: name.into(),
            activity,
            state,
            transition,
            source_path_hash,
        }
    }
}

impl fmt::Display for AnimationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.activity, self.state, self.transition)
    }
}

/// Parsing context: the asset root plus optional explicit overrides.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub root: PathBuf,
    pub state: Option<PetState>,
    pub activity: Option<Activity>,
    pub transition: Option<Transition>,
    pub name: Option<String>,
}

impl ParseContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: PetState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

const STATE_TAGS: &[(&str, PetState)] = &[
    ("happy", PetState::Happy),
    ("nomal", PetState::Normal),
    ("normal", PetState::Normal),
    ("poorcondition", PetState::Bad),
    ("bad", PetState::Bad),
    ("ill", PetState::Ill),
];

// Order matters: the first pattern whose tokens are all present wins.
const ACTIVITY_PATTERNS: &[(&[&str], Activity)] = &[
    (&["default"], Activity::CommonIdle),
    (&["idle"], Activity::Idle),
    (&["idel"], Activity::Idle),
    (&["state", "stateone"], Activity::Idle1),
    (&["state", "statetwo"], Activity::Idle2),
    (&["stateone"], Activity::Idle1),
    (&["statetwo"], Activity::Idle2),
    (&["move"], Activity::Move),
    (&["say"], Activity::Say),
    (&["raise", "dynamic"], Activity::RaisedDynamic),
    (&["raise", "static"], Activity::RaisedStatic),
    (&["shutdown"], Activity::Shutdown),
    (&["startup"], Activity::Startup),
    (&["sleep"], Activity::Sleep),
    (&["switch", "down"], Activity::SwitchDown),
    (&["switch", "up"], Activity::SwitchUp),
    (&["switch", "hunger"], Activity::SwitchHunger),
    (&["switch", "thirsty"], Activity::SwitchThirsty),
    (&["touch", "body"], Activity::TouchBody),
    (&["touch", "head"], Activity::TouchHead),
    (&["work"], Activity::Work),
];

const TRANSITION_TAGS: &[(&str, Transition)] = &[
    ("a", Transition::Start),
    ("start", Transition::Start),
    ("b", Transition::Loop),
    ("loop", Transition::Loop),
    ("c", Transition::End),
    ("end", Transition::End),
    ("single", Transition::Single),
];

/// Split a relative path into lowercase tags.
///
/// Separators are path separators (both styles) and underscores; empty
/// tags are dropped.
pub fn tokenize(relative: &Path) -> Vec<String> {
    relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .flat_map(|part| {
            part.split(['\\', '_'])
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Parse a frame or folder path into an [`AnimationKey`].
///
/// The file stem (if any) takes part in tagging, the extension does not.
/// Returns `None` for an unrecognized asset: no activity pattern matched
/// and no activity override was given.
pub fn parse_asset_path(path: &Path, ctx: &ParseContext) -> Option<AnimationKey> {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let tagged = match path.file_stem() {
        Some(stem) => dir.join(stem),
        None => path.to_path_buf(),
    };
    let relative = tagged.strip_prefix(&ctx.root).unwrap_or(&tagged);
    let mut tags = tokenize(relative);

    let state = ctx.state.unwrap_or_else(|| take_state(&mut tags));
    let activity = match ctx.activity {
        Some(activity) => activity,
        None => match take_activity(&mut tags) {
            Some(activity) => activity,
            None => {
                warn!("Unknown asset: {}, skipping", relative.display());
                return None;
            }
        },
    };
    let transition = ctx.transition.unwrap_or_else(|| take_transition(&mut tags));
    let name = match ctx.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => derive_name(&mut tags, activity),
    };

    let source_dir = dir.strip_prefix(&ctx.root).unwrap_or(dir);
    Some(AnimationKey {
        name,
        activity,
        state,
        transition,
        source_path_hash: path_hash(source_dir),
    })
}

/// Remove and return the first tag found in `table`.
fn take_first<T: Copy>(tags: &mut Vec<String>, table: &[(&str, T)]) -> Option<T> {
    let (i, value) = tags.iter().enumerate().find_map(|(i, tag)| {
        table
            .iter()
            .find(|(t, _)| tag.eq_ignore_ascii_case(t))
            .map(|(_, value)| (i, *value))
    })?;
    tags.remove(i);
    Some(value)
}

fn take_state(tags: &mut Vec<String>) -> PetState {
    take_first(tags, STATE_TAGS).unwrap_or(PetState::Normal)
}

fn take_activity(tags: &mut Vec<String>) -> Option<Activity> {
    'patterns: for (pattern, activity) in ACTIVITY_PATTERNS {
        let mut matched: Vec<usize> = Vec::with_capacity(pattern.len());
        for token in pattern.iter() {
            let found = tags
                .iter()
                .enumerate()
                .find(|(i, tag)| !matched.contains(i) && tag.eq_ignore_ascii_case(token))
                .map(|(i, _)| i);
            match found {
                Some(i) => matched.push(i),
                None => continue 'patterns,
            }
        }
        // Remove back to front so earlier indices stay valid.
        matched.sort_unstable_by(|a, b| b.cmp(a));
        for i in matched {
            tags.remove(i);
        }
        return Some(*activity);
    }
    None
}

fn take_transition(tags: &mut Vec<String>) -> Transition {
    take_first(tags, TRANSITION_TAGS).unwrap_or(Transition::Single)
}

/// Numeric value of a tag, if it is a plain number.
pub(crate) fn numeric_tag(tag: &str) -> Option<f64> {
    let first = tag.chars().next()?;
    if !(first.is_ascii_digit() || matches!(first, '-' | '+' | '.')) {
        return None;
    }
    tag.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn derive_name(tags: &mut Vec<String>, activity: Activity) -> String {
    let mut last_numeric: Option<f64> = None;
    while let Some(tail) = tags.last() {
        if let Some(value) = numeric_tag(tail) {
            last_numeric = Some(value);
        } else if !tail.starts_with('~') {
            break;
        }
        tags.pop();
    }

    if !tags.is_empty() {
        return tags.join("_");
    }
    match last_numeric {
        Some(n) => format!("{}_{}", activity.as_str(), n),
        None => activity.as_str().to_string(),
    }
}
