//! Nested value reconstruction from bracket-style field names.
//!
//! `user[addresses][0][city]` is the path `user` → `addresses` → `0` →
//! `city`. Containers are created on the way down: a segment that starts a
//! sequence (`0` or `[]`) creates a [`ParsedNode::Sequence`], anything else a
//! [`ParsedNode::Branch`].
//!
//! ```
//! use formdata_core::{ParsedNode, TreeBuilder};
//!
//! let mut tree = TreeBuilder::new();
//! tree.insert("a[0]", ParsedNode::text("x")).unwrap();
//! tree.insert("a[1]", ParsedNode::text("y")).unwrap();
//! tree.insert("b[c]", ParsedNode::text("z")).unwrap();
//!
//! let root = tree.finish();
//! let a = root.get("a").and_then(ParsedNode::as_sequence).unwrap();
//! assert_eq!(a[1].as_text(), Some("y"));
//! assert_eq!(root.get("b").and_then(|b| b.get("c")).and_then(ParsedNode::as_text), Some("z"));
//! ```

use crate::error::MultipartError;
use crate::file::FileHandle;
use std::collections::HashMap;

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Named key.
    Key(String),
    /// Decimal index without leading zeros.
    Index(usize),
    /// `[]`: the next free position.
    Append,
}

impl Segment {
    fn starts_sequence(&self) -> bool {
        matches!(self, Self::Index(0) | Self::Append)
    }
}

/// Deepest bracket path [`parse_field_path`] splits; longer names are literal.
pub const MAX_PATH_DEPTH: usize = 64;

/// Split a field name into path segments.
///
/// The first segment is always a [`Segment::Key`]. Names that do not follow
/// the `base[seg][seg]...` syntax, or that nest more than [`MAX_PATH_DEPTH`]
/// brackets deep, are returned as one literal key.
#[must_use]
pub fn parse_field_path(name: &str) -> Vec<Segment> {
    let literal = || vec![Segment::Key(name.to_string())];

    let Some(open) = name.find('[') else {
        return literal();
    };
    if open == 0 {
        return literal();
    }

    let mut segments = vec![Segment::Key(name[..open].to_string())];
    let mut rest = &name[open..];
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return literal();
        };
        let Some(close) = inner.find(']') else {
            return literal();
        };
        let raw = &inner[..close];
        if raw.contains('[') || segments.len() > MAX_PATH_DEPTH {
            return literal();
        }
        segments.push(classify(raw));
        rest = &inner[close + 1..];
    }
    segments
}

fn classify(raw: &str) -> Segment {
    if raw.is_empty() {
        return Segment::Append;
    }
    let canonical = raw.bytes().all(|b| b.is_ascii_digit()) && (raw == "0" || !raw.starts_with('0'));
    match raw.parse::<usize>() {
        Ok(index) if canonical => Segment::Index(index),
        _ => Segment::Key(raw.to_string()),
    }
}

/// Ordered mapping from key to node.
#[derive(Debug, Default)]
pub struct Branch {
    entries: Vec<(String, ParsedNode)>,
    index: HashMap<String, usize>,
}

impl Branch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParsedNode> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ParsedNode> {
        self.index.get(key).map(|&i| &mut self.entries[i].1)
    }

    /// Insert or overwrite `key`; an overwritten key keeps its position.
    pub fn insert(&mut self, key: String, node: ParsedNode) {
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = node;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, node));
        }
    }

    fn get_or_insert_with(&mut self, key: String, make: impl FnOnce() -> ParsedNode) -> &mut ParsedNode {
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let i = self.entries.len();
                self.index.insert(key.clone(), i);
                self.entries.push((key, make()));
                i
            }
        };
        &mut self.entries[i].1
    }

    /// Key for a `[]` append: one past the largest decimal index key.
    fn next_index(&self) -> Option<String> {
        let next = self
            .keys()
            .filter_map(|key| match classify(key) {
                Segment::Index(i) => Some(i),
                _ => None,
            })
            .max()
            .map_or(Some(0), |max| max.checked_add(1))?;
        Some(next.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParsedNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ParsedNode)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Branch {
    type Item = (String, ParsedNode);
    type IntoIter = std::vec::IntoIter<(String, ParsedNode)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A node of the decoded form tree.
#[derive(Debug)]
pub enum ParsedNode {
    Text(String),
    File(FileHandle),
    Branch(Branch),
    Sequence(Vec<ParsedNode>),
}

impl ParsedNode {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Text(_) | Self::File(_))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&FileHandle> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileHandle> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_branch(&self) -> Option<&Branch> {
        match self {
            Self::Branch(branch) => Some(branch),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[ParsedNode]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Child of a branch by key, or of a sequence by decimal index.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParsedNode> {
        match self {
            Self::Branch(branch) => branch.get(key),
            Self::Sequence(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            Self::Text(_) | Self::File(_) => None,
        }
    }

    /// Mutable counterpart of [`get`](Self::get).
    pub fn get_mut(&mut self, key: &str) -> Option<&mut ParsedNode> {
        match self {
            Self::Branch(branch) => branch.get_mut(key),
            Self::Sequence(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            Self::Text(_) | Self::File(_) => None,
        }
    }

    /// Follow a full field name such as `user[tags][1]`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ParsedNode> {
        parse_field_path(name)
            .iter()
            .try_fold(self, |node, segment| match segment {
                Segment::Key(key) => node.get(key),
                Segment::Index(i) => node.get(&i.to_string()),
                Segment::Append => None,
            })
    }

    /// Mutable counterpart of [`lookup`](Self::lookup).
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut ParsedNode> {
        parse_field_path(name)
            .iter()
            .try_fold(self, |node, segment| match segment {
                Segment::Key(key) => node.get_mut(key),
                Segment::Index(i) => node.get_mut(&i.to_string()),
                Segment::Append => None,
            })
    }

    fn container_for(segment: &Segment) -> Self {
        if segment.starts_sequence() {
            Self::Sequence(Vec::new())
        } else {
            Self::Branch(Branch::new())
        }
    }
}

/// Builds a [`ParsedNode`] tree from `(field name, leaf)` pairs.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    root: Branch,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `leaf` at the location described by `name`.
    ///
    /// Fails with [`MultipartError::ConflictingPath`] when the path has to
    /// pass through an existing text or file value, or when `leaf` would
    /// replace a branch or sequence.
    pub fn insert(&mut self, name: &str, leaf: ParsedNode) -> Result<(), MultipartError> {
        let segments = parse_field_path(name);
        let Some((Segment::Key(base), rest)) = segments.split_first() else {
            return Err(conflict(name));
        };
        insert_into_branch(&mut self.root, base.clone(), rest, leaf, name)
    }

    /// Root of the tree, always a branch.
    #[must_use]
    pub fn finish(self) -> ParsedNode {
        ParsedNode::Branch(self.root)
    }
}

fn conflict(name: &str) -> MultipartError {
    MultipartError::ConflictingPath {
        path: name.to_string(),
    }
}

fn insert_into_branch(
    branch: &mut Branch,
    key: String,
    rest: &[Segment],
    leaf: ParsedNode,
    name: &str,
) -> Result<(), MultipartError> {
    let Some(next) = rest.first() else {
        if branch.get(&key).is_some_and(|node| !node.is_leaf()) {
            return Err(conflict(name));
        }
        branch.insert(key, leaf);
        return Ok(());
    };

    let child = branch.get_or_insert_with(key, || ParsedNode::container_for(next));
    descend(child, rest, leaf, name)
}

/// Walk `rest` (non-empty) below the container `node`.
fn descend(
    node: &mut ParsedNode,
    rest: &[Segment],
    leaf: ParsedNode,
    name: &str,
) -> Result<(), MultipartError> {
    let (segment, tail) = rest.split_first().ok_or_else(|| conflict(name))?;

    if let ParsedNode::Sequence(items) = node {
        let position = match segment {
            Segment::Append => Some(items.len()),
            Segment::Index(i) if *i <= items.len() => Some(*i),
            _ => None,
        };
        if let Some(position) = position {
            return descend_sequence(items, position, tail, leaf, name);
        }
        // Gaps and named keys turn the sequence into a branch keyed by index.
        sequence_to_branch(node);
    }

    match node {
        ParsedNode::Branch(branch) => {
            let key = match segment {
                Segment::Key(key) => key.clone(),
                Segment::Index(i) => i.to_string(),
                Segment::Append => branch.next_index().ok_or_else(|| conflict(name))?,
            };
            insert_into_branch(branch, key, tail, leaf, name)
        }
        _ => Err(conflict(name)),
    }
}

fn descend_sequence(
    items: &mut Vec<ParsedNode>,
    position: usize,
    tail: &[Segment],
    leaf: ParsedNode,
    name: &str,
) -> Result<(), MultipartError> {
    let Some(next) = tail.first() else {
        if position == items.len() {
            items.push(leaf);
        } else if items[position].is_leaf() {
            items[position] = leaf;
        } else {
            return Err(conflict(name));
        }
        return Ok(());
    };

    if position == items.len() {
        items.push(ParsedNode::container_for(next));
    }
    descend(&mut items[position], tail, leaf, name)
}

fn sequence_to_branch(node: &mut ParsedNode) {
    if let ParsedNode::Sequence(items) = node {
        let mut branch = Branch::new();
        for (i, item) in std::mem::take(items).into_iter().enumerate() {
            branch.insert(i.to_string(), item);
        }
        *node = ParsedNode::Branch(branch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(pairs: &[(&str, &str)]) -> Result<ParsedNode, MultipartError> {
        let mut tree = TreeBuilder::new();
        for (name, value) in pairs {
            tree.insert(name, ParsedNode::text(*value))?;
        }
        Ok(tree.finish())
    }

    fn texts(node: &ParsedNode) -> Vec<&str> {
        node.as_sequence()
            .unwrap()
            .iter()
            .filter_map(ParsedNode::as_text)
            .collect()
    }

    #[test]
    fn parses_paths() {
        assert_eq!(parse_field_path("a"), vec![Segment::Key("a".into())]);
        assert_eq!(
            parse_field_path("user[addresses][0][city]"),
            vec![
                Segment::Key("user".into()),
                Segment::Key("addresses".into()),
                Segment::Index(0),
                Segment::Key("city".into()),
            ]
        );
        assert_eq!(
            parse_field_path("tags[]"),
            vec![Segment::Key("tags".into()), Segment::Append]
        );
        assert_eq!(
            parse_field_path("a[01]"),
            vec![Segment::Key("a".into()), Segment::Key("01".into())]
        );
    }

    #[test]
    fn malformed_paths_are_literal_keys() {
        for name in ["a[b", "[a]", "a[b]c", "a[b[c]]", "a]"] {
            assert_eq!(parse_field_path(name), vec![Segment::Key(name.into())], "{name}");
        }
    }

    #[test]
    fn sequences_and_branches() {
        let root = build(&[("a[0]", "x"), ("a[1]", "y"), ("b[c]", "z")]).unwrap();
        assert_eq!(texts(root.get("a").unwrap()), vec!["x", "y"]);
        assert_eq!(root.lookup("b[c]").and_then(ParsedNode::as_text), Some("z"));
        assert_eq!(root.as_branch().unwrap().keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn leaf_then_descend_conflicts() {
        let err = build(&[("a", "1"), ("a[b]", "2")]).unwrap_err();
        assert!(matches!(err, MultipartError::ConflictingPath { path } if path == "a[b]"));
    }

    #[test]
    fn leaf_over_container_conflicts() {
        let err = build(&[("a[b]", "1"), ("a", "2")]).unwrap_err();
        assert!(matches!(err, MultipartError::ConflictingPath { .. }));
        let err = build(&[("a[0][b]", "1"), ("a[0]", "2")]).unwrap_err();
        assert!(matches!(err, MultipartError::ConflictingPath { .. }));
    }

    #[test]
    fn nested_objects_inside_sequences() {
        let root = build(&[
            ("user[addresses][0][city]", "Oslo"),
            ("user[addresses][0][zip]", "0150"),
            ("user[addresses][1][city]", "Bergen"),
            ("user[name]", "Kari"),
        ])
        .unwrap();
        let addresses = root.lookup("user[addresses]").unwrap().as_sequence().unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0].get("zip").and_then(ParsedNode::as_text), Some("0150"));
        assert_eq!(addresses[1].get("city").and_then(ParsedNode::as_text), Some("Bergen"));
        assert_eq!(root.lookup("user[name]").and_then(ParsedNode::as_text), Some("Kari"));
    }

    #[test]
    fn append_segments_push() {
        let root = build(&[("tags[]", "a"), ("tags[]", "b"), ("tags[]", "c")]).unwrap();
        assert_eq!(texts(root.get("tags").unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn gaps_turn_sequences_into_branches() {
        let root = build(&[("a[0]", "x"), ("a[5]", "y")]).unwrap();
        let a = root.get("a").unwrap().as_branch().unwrap();
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["0", "5"]);

        let root = build(&[("b[3]", "x")]).unwrap();
        assert!(root.get("b").unwrap().as_branch().is_some());
    }

    #[test]
    fn named_key_after_indices_converts_to_branch() {
        let root = build(&[("a[0]", "x"), ("a[name]", "y")]).unwrap();
        let a = root.get("a").unwrap().as_branch().unwrap();
        assert_eq!(a.get("0").and_then(ParsedNode::as_text), Some("x"));
        assert_eq!(a.get("name").and_then(ParsedNode::as_text), Some("y"));
    }

    #[test]
    fn repeated_leaf_overwrites_in_place() {
        let root = build(&[("a", "1"), ("b", "2"), ("a", "3"), ("s[0]", "x"), ("s[0]", "y")]).unwrap();
        let keys: Vec<_> = root.as_branch().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b", "s"]);
        assert_eq!(root.get("a").and_then(ParsedNode::as_text), Some("3"));
        assert_eq!(texts(root.get("s").unwrap()), vec!["y"]);
    }

    #[test]
    fn append_into_branch_takes_a_fresh_index() {
        let root = build(&[("a[1]", "x"), ("a[]", "y"), ("a[]", "z")]).unwrap();
        let a = root.get("a").unwrap().as_branch().unwrap();
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["1", "2", "3"]);
        assert_eq!(a.get("1").and_then(ParsedNode::as_text), Some("x"));
        assert_eq!(a.get("2").and_then(ParsedNode::as_text), Some("y"));

        let root = build(&[("b[k]", "x"), ("b[]", "y")]).unwrap();
        assert_eq!(root.lookup("b[0]").and_then(ParsedNode::as_text), Some("y"));
    }

    #[test]
    fn overly_deep_names_are_literal_keys() {
        let deep = format!("a{}", "[x]".repeat(MAX_PATH_DEPTH + 1));
        assert_eq!(parse_field_path(&deep), vec![Segment::Key(deep.clone())]);

        let limit = format!("a{}", "[x]".repeat(MAX_PATH_DEPTH));
        assert_eq!(parse_field_path(&limit).len(), MAX_PATH_DEPTH + 1);

        let root = build(&[(deep.as_str(), "v")]).unwrap();
        assert_eq!(root.get(&deep).and_then(ParsedNode::as_text), Some("v"));
    }

    #[test]
    fn numeric_top_level_names_stay_keys() {
        let root = build(&[("0", "zero"), ("1", "one")]).unwrap();
        assert_eq!(root.get("0").and_then(ParsedNode::as_text), Some("zero"));
        assert!(root.as_branch().is_some());
    }
}
