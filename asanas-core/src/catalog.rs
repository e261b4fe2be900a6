//! Catalog Model - Asanas, Forms, Tags, Scores, Sequences
//!
//! Tags and scored values point at a typed `EntityRef` rather than a generic
//! foreign key. The store trait carries the get-or-create operations the
//! importer relies on; `MemoryCatalog` is the in-process implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Id = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Asana,
    AsanaForm,
    Sequence,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Id,
}

impl EntityRef {
    pub fn asana(id: Id) -> Self {
        Self { kind: EntityKind::Asana, id }
    }

    pub fn form(id: Id) -> Self {
        Self { kind: EntityKind::AsanaForm, id }
    }

    pub fn sequence(id: Id) -> Self {
        Self { kind: EntityKind::Sequence, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?}:{}>", self.kind, self.id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Form already exists: {name} variant {variant}")]
    DuplicateForm { name: String, variant: u32 },

    #[error("Unknown entity {0}")]
    UnknownEntity(EntityRef),

    #[error("Unknown user #{0}")]
    UnknownUser(Id),

    #[error("Unknown tag #{0}")]
    UnknownTag(Id),

    #[error("Unknown score #{0}")]
    UnknownScore(Id),

    #[error("Score {name}: max {max} must be greater than min {min}")]
    InvalidScoreRange { name: String, min: u32, max: u32 },

    #[error("No superuser in catalog")]
    NoOwner,

    #[error("Span {start}..={end} is outside a sequence of {len} steps")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },

    #[error("Span {start}..={end} overlaps an existing span")]
    OverlappingSpan { start: usize, end: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub is_superuser: bool,
    pub joined: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asana {
    pub id: Id,
    pub name: String,
    pub note: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Stored pictogram of a form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Picture {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsanaForm {
    pub id: Id,
    pub asana: Id,
    pub variant: u32,
    pub pict: Picture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub target: EntityRef,
    pub owner: Id,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Private,
    Public,
}

/// A named, ranged attribute such as difficulty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub id: Id,
    pub name: String,
    pub owner: Id,
    pub privacy: Privacy,
    pub min: u32,
    pub max: u32,
}

impl Score {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredValue {
    pub id: Id,
    pub score: Id,
    pub target: EntityRef,
    pub value: u32,
}

/// Breaths held on a step: 1 to 9, 12, 18 or 27
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreathCount(u8);

impl BreathCount {
    const ALLOWED: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 12, 18, 27];

    pub fn new(count: u8) -> Option<Self> {
        Self::ALLOWED.contains(&count).then_some(Self(count))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Annotations on a sequence step or span. Stored by code (`lr`, `breath_5`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum Mark {
    LeftRight,
    Twice,
    FourTimes,
    Dynamic,
    Breaths(BreathCount),
}

impl Mark {
    pub fn breaths(count: u8) -> Option<Self> {
        BreathCount::new(count).map(Mark::Breaths)
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "lr" => Some(Mark::LeftRight),
            "x2" => Some(Mark::Twice),
            "x4" => Some(Mark::FourTimes),
            "dyn" => Some(Mark::Dynamic),
            _ => code
                .strip_prefix("breath_")
                .and_then(|n| n.parse().ok())
                .and_then(Self::breaths),
        }
    }

    pub fn code(&self) -> String {
        match self {
            Mark::LeftRight => "lr".into(),
            Mark::Twice => "x2".into(),
            Mark::FourTimes => "x4".into(),
            Mark::Dynamic => "dyn".into(),
            Mark::Breaths(n) => format!("breath_{}", n.get()),
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::LeftRight => f.write_str("L,R"),
            Mark::Twice => f.write_str("X 2"),
            Mark::FourTimes => f.write_str("X 4"),
            Mark::Dynamic => f.write_str("dynamic"),
            Mark::Breaths(n) => write!(f, "<{}>", n.get()),
        }
    }
}

impl TryFrom<String> for Mark {
    type Error = String;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Self::from_code(&code).ok_or_else(|| format!("unknown mark code {:?}", code))
    }
}

impl From<Mark> for String {
    fn from(mark: Mark) -> Self {
        mark.code()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Tagged item placed at this position
    pub element: Id,
    pub marks: Vec<Mark>,
}

/// Inclusive range of steps performed as a group
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubSequence {
    pub start: usize,
    pub end: usize,
    pub mark: Option<Mark>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Id,
    pub name: String,
    pub owner: Id,
    pub steps: Vec<SequenceStep>,
    pub spans: Vec<SubSequence>,
}

impl Sequence {
    pub fn mark_span(&mut self, start: usize, end: usize, mark: Option<Mark>) -> Result<(), CatalogError> {
        if start > end || end >= self.steps.len() {
            return Err(CatalogError::SpanOutOfBounds { start, end, len: self.steps.len() });
        }
        if self.spans.iter().any(|s| start <= s.end && s.start <= end) {
            return Err(CatalogError::OverlappingSpan { start, end });
        }
        self.spans.push(SubSequence { start, end, mark });
        self.spans.sort_by_key(|s| s.start);
        Ok(())
    }

    /// Span covering step `index`, if any
    pub fn span_at(&self, index: usize) -> Option<&SubSequence> {
        self.spans.iter().find(|s| (s.start..=s.end).contains(&index))
    }
}

/// Store operations used by the bulk importer
pub trait CatalogStore {
    fn get_or_create_asana(&mut self, name: &str) -> Result<Id, CatalogError>;

    /// Fails when the asana already has a form with this variant.
    fn add_form(&mut self, asana: Id, variant: u32, pict: Picture) -> Result<EntityRef, CatalogError>;

    fn get_or_create_tag(&mut self, name: &str, target: EntityRef, owner: Id) -> Result<Id, CatalogError>;

    fn get_or_create_score(&mut self, name: &str, min: u32, max: u32, owner: Id) -> Result<Id, CatalogError>;

    fn get_or_create_scored_value(&mut self, score: Id, target: EntityRef, value: u32) -> Result<Id, CatalogError>;

    /// The superuser who joined first; owns imported tags and scores.
    fn earliest_superuser(&self) -> Result<Id, CatalogError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCatalog {
    users: BTreeMap<Id, User>,
    asanas: BTreeMap<Id, Asana>,
    forms: BTreeMap<Id, AsanaForm>,
    tags: BTreeMap<Id, Tag>,
    scores: BTreeMap<Id, Score>,
    scored: BTreeMap<Id, ScoredValue>,
    sequences: BTreeMap<Id, Sequence>,
    last_id: Id,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }

    pub fn add_user(&mut self, username: &str, is_superuser: bool, joined: DateTime<Utc>) -> Id {
        let id = self.next_id();
        self.users.insert(id, User { id, username: username.to_string(), is_superuser, joined });
        id
    }

    pub fn user_by_name(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username == username)
    }

    pub fn asana(&self, id: Id) -> Option<&Asana> {
        self.asanas.get(&id)
    }

    pub fn find_asana(&self, name: &str) -> Option<&Asana> {
        self.asanas.values().find(|a| a.name == name)
    }

    pub fn form(&self, id: Id) -> Option<&AsanaForm> {
        self.forms.get(&id)
    }

    pub fn forms(&self) -> impl Iterator<Item = &AsanaForm> {
        self.forms.values()
    }

    /// Form caption: the asana name, plus the variant when non-zero
    pub fn form_name(&self, id: Id) -> Option<String> {
        let form = self.forms.get(&id)?;
        let asana = self.asanas.get(&form.asana)?;
        Some(if form.variant > 0 {
            format!("{} {}", asana.name, form.variant)
        } else {
            asana.name.clone()
        })
    }

    pub fn score(&self, id: Id) -> Option<&Score> {
        self.scores.get(&id)
    }

    pub fn tags_for(&self, target: EntityRef) -> Vec<&Tag> {
        self.tags.values().filter(|t| t.target == target).collect()
    }

    pub fn value_of(&self, score: Id, target: EntityRef) -> Option<u32> {
        self.scored
            .values()
            .find(|s| s.score == score && s.target == target)
            .map(|s| s.value)
    }

    /// Entities whose value under `score` is at least `min`
    pub fn scored_at_least(&self, score: Id, min: u32) -> Vec<EntityRef> {
        self.scored
            .values()
            .filter(|s| s.score == score && s.value >= min)
            .map(|s| s.target)
            .collect()
    }

    pub fn create_sequence(&mut self, name: &str, owner: Id) -> Result<Id, CatalogError> {
        self.require_user(owner)?;
        let id = self.next_id();
        self.sequences.insert(id, Sequence {
            id,
            name: name.to_string(),
            owner,
            steps: vec![],
            spans: vec![],
        });
        Ok(id)
    }

    pub fn sequence(&self, id: Id) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    pub fn append_step(&mut self, sequence: Id, tag: Id, marks: Vec<Mark>) -> Result<usize, CatalogError> {
        if !self.tags.contains_key(&tag) {
            return Err(CatalogError::UnknownTag(tag));
        }
        let seq = self
            .sequences
            .get_mut(&sequence)
            .ok_or(CatalogError::UnknownEntity(EntityRef::sequence(sequence)))?;
        seq.steps.push(SequenceStep { element: tag, marks });
        Ok(seq.steps.len() - 1)
    }

    pub fn mark_span(
        &mut self,
        sequence: Id,
        start: usize,
        end: usize,
        mark: Option<Mark>,
    ) -> Result<(), CatalogError> {
        self.sequences
            .get_mut(&sequence)
            .ok_or(CatalogError::UnknownEntity(EntityRef::sequence(sequence)))?
            .mark_span(start, end, mark)
    }

    fn require_user(&self, id: Id) -> Result<(), CatalogError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::UnknownUser(id))
        }
    }

    fn require_entity(&self, target: EntityRef) -> Result<(), CatalogError> {
        let exists = match target.kind {
            EntityKind::Asana => self.asanas.contains_key(&target.id),
            EntityKind::AsanaForm => self.forms.contains_key(&target.id),
            EntityKind::Sequence => self.sequences.contains_key(&target.id),
        };
        if exists {
            Ok(())
        } else {
            Err(CatalogError::UnknownEntity(target))
        }
    }
}

impl CatalogStore for MemoryCatalog {
    fn get_or_create_asana(&mut self, name: &str) -> Result<Id, CatalogError> {
        if let Some(existing) = self.find_asana(name) {
            return Ok(existing.id);
        }
        let id = self.next_id();
        let now = Utc::now();
        self.asanas.insert(id, Asana {
            id,
            name: name.to_string(),
            note: None,
            created: now,
            updated: now,
        });
        Ok(id)
    }

    fn add_form(&mut self, asana: Id, variant: u32, pict: Picture) -> Result<EntityRef, CatalogError> {
        let name = self
            .asanas
            .get(&asana)
            .map(|a| a.name.clone())
            .ok_or(CatalogError::UnknownEntity(EntityRef::asana(asana)))?;
        if self.forms.values().any(|f| f.asana == asana && f.variant == variant) {
            return Err(CatalogError::DuplicateForm { name, variant });
        }

        let id = self.next_id();
        self.forms.insert(id, AsanaForm { id, asana, variant, pict });
        if let Some(a) = self.asanas.get_mut(&asana) {
            a.updated = Utc::now();
        }
        Ok(EntityRef::form(id))
    }

    fn get_or_create_tag(&mut self, name: &str, target: EntityRef, owner: Id) -> Result<Id, CatalogError> {
        self.require_user(owner)?;
        self.require_entity(target)?;
        if let Some(tag) = self
            .tags
            .values()
            .find(|t| t.name == name && t.target == target && t.owner == owner)
        {
            return Ok(tag.id);
        }
        let id = self.next_id();
        self.tags.insert(id, Tag { id, name: name.to_string(), target, owner });
        Ok(id)
    }

    fn get_or_create_score(&mut self, name: &str, min: u32, max: u32, owner: Id) -> Result<Id, CatalogError> {
        self.require_user(owner)?;
        if max <= min {
            return Err(CatalogError::InvalidScoreRange { name: name.to_string(), min, max });
        }
        if let Some(score) = self
            .scores
            .values()
            .find(|s| s.name == name && s.min == min && s.max == max && s.owner == owner)
        {
            return Ok(score.id);
        }
        let id = self.next_id();
        self.scores.insert(id, Score {
            id,
            name: name.to_string(),
            owner,
            privacy: Privacy::Private,
            min,
            max,
        });
        Ok(id)
    }

    fn get_or_create_scored_value(&mut self, score: Id, target: EntityRef, value: u32) -> Result<Id, CatalogError> {
        if !self.scores.contains_key(&score) {
            return Err(CatalogError::UnknownScore(score));
        }
        self.require_entity(target)?;
        if let Some(existing) = self
            .scored
            .values()
            .find(|s| s.score == score && s.target == target && s.value == value)
        {
            return Ok(existing.id);
        }
        let id = self.next_id();
        self.scored.insert(id, ScoredValue { id, score, target, value });
        Ok(id)
    }

    fn earliest_superuser(&self) -> Result<Id, CatalogError> {
        self.users
            .values()
            .filter(|u| u.is_superuser)
            .min_by_key(|u| (u.joined, u.id))
            .map(|u| u.id)
            .ok_or(CatalogError::NoOwner)
    }
}
