//! Domain types shared by the watcher, the orchestrator and the runtime.
//!
//! Snapshots are immutable once built: the aggregate hash is computed at
//! construction (and again on deserialization) and never stored by hand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A content hash naming one externally stored asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContentHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContentHash {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Host address of a live target. Only valid while the target exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Category of synchronized object. The primary target owns the others.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    #[default]
    Player,
    MinionOrMount,
    Pet,
    Companion,
}

impl ObjectKind {
    pub fn all() -> &'static [ObjectKind] {
        &[
            ObjectKind::Player,
            ObjectKind::MinionOrMount,
            ObjectKind::Pet,
            ObjectKind::Companion,
        ]
    }

    pub fn is_primary(self) -> bool {
        self == ObjectKind::Player
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Player => write!(f, "player"),
            ObjectKind::MinionOrMount => write!(f, "minion_or_mount"),
            ObjectKind::Pet => write!(f, "pet"),
            ObjectKind::Companion => write!(f, "companion"),
        }
    }
}

/// One kind of detected difference between two snapshots, scoped to a category.
///
/// Declaration order is the order in which per-category steps are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Palette,
    BodyScale,
    HeelsOffset,
    TitleText,
    AppearanceDescription,
    ModFiles,
    ModManipulation,
}

impl ChangeKind {
    /// Kinds handled by per-category feature backends, in application order.
    pub fn customization() -> &'static [ChangeKind] {
        &[
            ChangeKind::Palette,
            ChangeKind::BodyScale,
            ChangeKind::HeelsOffset,
            ChangeKind::TitleText,
            ChangeKind::AppearanceDescription,
        ]
    }

    pub fn is_mod_change(self) -> bool {
        matches!(self, ChangeKind::ModFiles | ChangeKind::ModManipulation)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeKind::Palette => "palette",
            ChangeKind::BodyScale => "body_scale",
            ChangeKind::HeelsOffset => "heels_offset",
            ChangeKind::TitleText => "title_text",
            ChangeKind::AppearanceDescription => "appearance_description",
            ChangeKind::ModFiles => "mod_files",
            ChangeKind::ModManipulation => "mod_manipulation",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Stable identity of a target. Resolved to an [`Address`] on every use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub name: String,
    pub kind: ObjectKind,
}

impl TargetIdentity {
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Player,
        }
    }

    /// Identity of an object of `kind` owned by the same primary.
    pub fn with_kind(&self, kind: ObjectKind) -> Self {
        Self {
            name: self.name.clone(),
            kind,
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.kind)
    }
}

/// A resolved target: identity plus the address it had when resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHandle {
    pub identity: TargetIdentity,
    pub address: Address,
}

/// Number of equipment bytes in a fingerprint (ten slots, four bytes each).
pub const EQUIPMENT_LEN: usize = 40;
/// Number of customization bytes in a fingerprint.
pub const CUSTOMIZATION_LEN: usize = 26;

/// Raw bytes read from a live target by the host.
///
/// `headwear` and `visor_weapon` are `None` for targets that do not expose them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFingerprint {
    pub equipment: [u8; EQUIPMENT_LEN],
    pub customization: [u8; CUSTOMIZATION_LEN],
    pub headwear: Option<u8>,
    pub visor_weapon: Option<u8>,
}

impl Default for RawFingerprint {
    fn default() -> Self {
        Self {
            equipment: [0; EQUIPMENT_LEN],
            customization: [0; CUSTOMIZATION_LEN],
            headwear: None,
            visor_weapon: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A content-addressed pointer plus the game paths it replaces.
///
/// With `swap_path` set the hash is ignored and the swap path is used as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetReference {
    pub hash: ContentHash,
    pub game_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_path: Option<String>,
}

impl AssetReference {
    pub fn hashed(hash: impl Into<ContentHash>, game_paths: &[&str]) -> Self {
        Self {
            hash: hash.into(),
            game_paths: game_paths.iter().map(|p| (*p).to_owned()).collect(),
            swap_path: None,
        }
    }

    pub fn swapped(swap_path: impl Into<String>, game_paths: &[&str]) -> Self {
        Self {
            hash: ContentHash(String::new()),
            game_paths: game_paths.iter().map(|p| (*p).to_owned()).collect(),
            swap_path: Some(swap_path.into()),
        }
    }
}

/// Intended state of one category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryState {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_scale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heels_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Read from the primary category only; the rendering backend keeps a
    /// single manipulation set per peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manipulation: Option<String>,
}

impl CategoryState {
    /// Payload carried for a customization or manipulation change kind.
    ///
    /// Returns `None` for [`ChangeKind::ModFiles`], which has no string payload.
    pub fn payload(&self, kind: ChangeKind) -> Option<&str> {
        match kind {
            ChangeKind::Palette => self.palette.as_deref(),
            ChangeKind::BodyScale => self.body_scale.as_deref(),
            ChangeKind::HeelsOffset => self.heels_offset.as_deref(),
            ChangeKind::TitleText => self.title.as_deref(),
            ChangeKind::AppearanceDescription => self.appearance.as_deref(),
            ChangeKind::ModManipulation => self.manipulation.as_deref(),
            ChangeKind::ModFiles => None,
        }
    }

    /// Asset references as an order-independent set.
    pub fn asset_set(&self) -> BTreeSet<&AssetReference> {
        self.assets.iter().collect()
    }
}

/// Immutable description of a target's full intended configuration.
///
/// Compared by value; [`StateSnapshot::aggregate_hash`] is the cheap equality test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SnapshotWire", into = "SnapshotWire")]
pub struct StateSnapshot {
    categories: BTreeMap<ObjectKind, CategoryState>,
    aggregate_hash: ContentHash,
}

#[derive(Serialize, Deserialize)]
struct SnapshotWire {
    #[serde(default)]
    categories: BTreeMap<ObjectKind, CategoryState>,
}

impl From<SnapshotWire> for StateSnapshot {
    fn from(wire: SnapshotWire) -> Self {
        Self::new(wire.categories)
    }
}

impl From<StateSnapshot> for SnapshotWire {
    fn from(snapshot: StateSnapshot) -> Self {
        Self {
            categories: snapshot.categories,
        }
    }
}

impl StateSnapshot {
    pub fn new(categories: BTreeMap<ObjectKind, CategoryState>) -> Self {
        let aggregate_hash = hash_categories(&categories);
        Self {
            categories,
            aggregate_hash,
        }
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    pub fn aggregate_hash(&self) -> &ContentHash {
        &self.aggregate_hash
    }

    pub fn categories(&self) -> &BTreeMap<ObjectKind, CategoryState> {
        &self.categories
    }

    pub fn category(&self, kind: ObjectKind) -> Option<&CategoryState> {
        self.categories.get(&kind)
    }

    /// Manipulation payload handed to the rendering backend (primary category's).
    pub fn manipulation(&self) -> Option<&str> {
        self.category(ObjectKind::Player)
            .and_then(|c| c.manipulation.as_deref())
    }
}

fn hash_categories(categories: &BTreeMap<ObjectKind, CategoryState>) -> ContentHash {
    // BTreeMap keys and struct field order make the JSON encoding canonical.
    let encoded = serde_json::to_vec(categories).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    ContentHash(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Change sets
// ---------------------------------------------------------------------------

/// Per-category change kinds computed by diffing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChangeSet {
    changes: BTreeMap<ObjectKind, BTreeSet<ChangeKind>>,
    /// Changes whose payload is absent in the new snapshot and gets reverted.
    #[serde(skip)]
    cleared: BTreeSet<(ObjectKind, ChangeKind)>,
}

impl ChangeSet {
    pub fn insert(&mut self, kind: ObjectKind, change: ChangeKind) {
        self.changes.entry(kind).or_default().insert(change);
        self.cleared.remove(&(kind, change));
    }

    /// Record a change that removes its payload.
    pub fn insert_cleared(&mut self, kind: ObjectKind, change: ChangeKind) {
        self.changes.entry(kind).or_default().insert(change);
        self.cleared.insert((kind, change));
    }

    pub fn is_cleared(&self, kind: ObjectKind, change: ChangeKind) -> bool {
        self.cleared.contains(&(kind, change))
    }

    pub fn is_empty(&self) -> bool {
        self.changes.values().all(BTreeSet::is_empty)
    }

    pub fn contains(&self, kind: ObjectKind, change: ChangeKind) -> bool {
        self.changes
            .get(&kind)
            .map(|set| set.contains(&change))
            .unwrap_or(false)
    }

    /// True if any category carries `change`.
    pub fn any(&self, change: ChangeKind) -> bool {
        self.changes.values().any(|set| set.contains(&change))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectKind, &BTreeSet<ChangeKind>)> {
        self.changes
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(kind, set)| (*kind, set))
    }

    pub fn kinds_for(&self, kind: ObjectKind) -> impl Iterator<Item = ChangeKind> + '_ {
        self.changes.get(&kind).into_iter().flatten().copied()
    }

    /// Whether applying `kind` needs an explicit redraw.
    ///
    /// Asset changes need one, unless an appearance payload is applied to
    /// the same category, which redraws on its own. Clearing the appearance
    /// reverts it without a redraw.
    pub fn needs_redraw(&self, kind: ObjectKind) -> bool {
        let Some(set) = self.changes.get(&kind) else {
            return false;
        };
        let touches_mods = set.iter().any(|c| c.is_mod_change());
        let applies_appearance = set.contains(&ChangeKind::AppearanceDescription)
            && !self.is_cleared(kind, ChangeKind::AppearanceDescription);
        touches_mods && !applies_appearance
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
