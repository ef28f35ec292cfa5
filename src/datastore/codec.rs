//! Path codec - conversions between the nested tree and flat path views
//!
//! The datastore is addressed with slash-delimited paths such as
//! `mix/chan/0/matrix/fader`. Clients exchange flat maps of those paths,
//! while the store keeps a nested tree.

use super::error::StoreError;
use super::types::{Branch, FlatView, Node, Scalar};

/// Flat key that addresses the base path itself instead of a child
pub const VALUE_KEY: &str = "value";

/// Split a slash-delimited path into segments, ignoring empty segments
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Flatten a node into a map of full paths to leaf values.
///
/// Empty branches produce no entries, so an empty subtree reads as `{}`.
/// A bare leaf flattens to a single entry under the empty path.
pub fn flatten(node: &Node) -> FlatView {
    let mut out = FlatView::new();
    flatten_into(node, "", &mut out);
    out
}

/// Flatten the children of a branch, keyed relative to the branch
pub fn flatten_branch(children: &Branch) -> FlatView {
    let mut out = FlatView::new();
    for (segment, child) in children {
        flatten_into(child, segment, &mut out);
    }
    out
}

fn flatten_into(node: &Node, path: &str, out: &mut FlatView) {
    match node {
        Node::Leaf(value) => {
            out.insert(path.to_string(), value.clone());
        }
        Node::Branch(children) => {
            for (segment, child) in children {
                let child_path = if path.is_empty() {
                    segment.clone()
                } else {
                    format!("{}/{}", path, segment)
                };
                flatten_into(child, &child_path, out);
            }
        }
    }
}

/// Infer a scalar type from untyped input: integer, then float, then text.
///
/// Never fails; unparseable input is kept as the original string.
pub fn coerce_scalar(raw: &str) -> Scalar {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Scalar::Int(n);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Scalar::Float(f);
    }
    Scalar::Text(raw.to_string())
}

/// Expand a flat map of sub-paths into a tree fragment rooted at the store root.
///
/// Each key is appended to `base_path`; the key `"value"` addresses `base_path`
/// itself. Keys are applied in order, so when a later key needs a branch where an
/// earlier key left a leaf, the branch wins.
pub fn expand(values: &FlatView, base_path: &str) -> Result<Branch, StoreError> {
    let base = split_path(base_path);
    let mut root = Branch::new();

    for (key, value) in values {
        let mut parts = base.clone();
        if key != VALUE_KEY {
            parts.extend(split_path(key));
        }

        let Some((last, parents)) = parts.split_last() else {
            return Err(StoreError::LeafAtRoot);
        };

        let mut level = &mut root;
        for segment in parents {
            level = level
                .entry(segment.to_string())
                .or_insert_with(Node::empty_branch)
                .make_branch();
        }
        level.insert(last.to_string(), Node::Leaf(value.clone().coerced()));
    }

    Ok(root)
}

/// Merge `incoming` into `target` without erasing siblings.
///
/// Branches present on both sides are merged recursively; anything else in
/// `incoming` replaces the existing entry wholesale.
pub fn merge(target: &mut Branch, incoming: Branch) {
    for (key, node) in incoming {
        match node {
            Node::Branch(children) => match target.get_mut(&key) {
                Some(Node::Branch(existing)) => merge(existing, children),
                _ => {
                    target.insert(key, Node::Branch(children));
                }
            },
            leaf => {
                target.insert(key, leaf);
            }
        }
    }
}

/// Read the flat view of `root` at `path`.
///
/// An empty path flattens everything. Missing or type-mismatched segments read
/// as `{}`. A leaf reads as a single entry keyed `"value"`.
pub fn view(root: &Branch, path: &str) -> FlatView {
    let mut segments = split_path(path).into_iter();

    let Some(first) = segments.next() else {
        return flatten_branch(root);
    };
    let Some(mut node) = root.get(first) else {
        return FlatView::new();
    };

    for segment in segments {
        let next = match node {
            Node::Branch(children) => children.get(segment),
            Node::Leaf(_) => None,
        };
        match next {
            Some(child) => node = child,
            None => return FlatView::new(),
        }
    }

    match node {
        Node::Leaf(value) => FlatView::from([(VALUE_KEY.to_string(), value.clone())]),
        Node::Branch(children) => flatten_branch(children),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(value: impl Into<Scalar>) -> Node {
        Node::Leaf(value.into())
    }

    fn branch<const N: usize>(children: [(&str, Node); N]) -> Branch {
        children
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn flat<const N: usize>(entries: [(&str, Scalar); N]) -> FlatView {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_flatten_tree() {
        let tree = Node::Branch(branch([(
            "mix",
            Node::Branch(branch([
                (
                    "chan",
                    Node::Branch(branch([(
                        "0",
                        Node::Branch(branch([("name", leaf("Channel 0"))])),
                    )])),
                ),
                (
                    "group",
                    Node::Branch(branch([(
                        "0",
                        Node::Branch(branch([("send", leaf(1.0))])),
                    )])),
                ),
            ])),
        )]));

        assert_eq!(
            flatten(&tree),
            flat([
                ("mix/chan/0/name", Scalar::from("Channel 0")),
                ("mix/group/0/send", Scalar::Float(1.0)),
            ])
        );
    }

    #[test]
    fn test_flatten_drops_empty_branches() {
        let tree = Node::Branch(branch([
            ("empty", Node::empty_branch()),
            ("x", leaf(1)),
        ]));
        assert_eq!(flatten(&tree), flat([("x", Scalar::Int(1))]));
    }

    #[test]
    fn test_coerce_scalar() {
        assert_eq!(coerce_scalar("1"), Scalar::Int(1));
        assert_eq!(coerce_scalar("-3"), Scalar::Int(-3));
        assert_eq!(coerce_scalar("1.0"), Scalar::Float(1.0));
        assert_eq!(coerce_scalar(" 2.5 "), Scalar::Float(2.5));
        assert_eq!(coerce_scalar("Channel1"), Scalar::from("Channel1"));
        assert_eq!(coerce_scalar(""), Scalar::from(""));
    }

    #[test]
    fn test_expand_tree_with_nested_indices() {
        let values = flat([
            ("0/name", Scalar::from("ibank0")),
            ("0/ch/0/name", Scalar::from("ibank0ch0")),
            ("0/ch/0/defaultName", Scalar::from("ibank0ch0Default")),
            ("1/name", Scalar::from("ibank1")),
            ("1/ch/0/name", Scalar::from("ibank1ch0")),
        ]);

        let expected = branch([(
            "ext",
            Node::Branch(branch([(
                "ibank",
                Node::Branch(branch([
                    (
                        "0",
                        Node::Branch(branch([
                            ("name", leaf("ibank0")),
                            (
                                "ch",
                                Node::Branch(branch([(
                                    "0",
                                    Node::Branch(branch([
                                        ("name", leaf("ibank0ch0")),
                                        ("defaultName", leaf("ibank0ch0Default")),
                                    ])),
                                )])),
                            ),
                        ])),
                    ),
                    (
                        "1",
                        Node::Branch(branch([
                            ("name", leaf("ibank1")),
                            (
                                "ch",
                                Node::Branch(branch([(
                                    "0",
                                    Node::Branch(branch([("name", leaf("ibank1ch0"))])),
                                )])),
                            ),
                        ])),
                    ),
                ])),
            )])),
        )]);

        assert_eq!(expand(&values, "ext/ibank").unwrap(), expected);
    }

    #[test]
    fn test_expand_value_key_addresses_base() {
        let values = flat([("value", Scalar::from("0.5"))]);
        let expected = branch([(
            "mix",
            Node::Branch(branch([("fader", leaf(0.5))])),
        )]);
        assert_eq!(expand(&values, "mix/fader").unwrap(), expected);
    }

    #[test]
    fn test_expand_value_key_at_root_is_rejected() {
        let values = flat([("value", Scalar::Int(1))]);
        assert_eq!(expand(&values, ""), Err(StoreError::LeafAtRoot));
    }

    #[test]
    fn test_expand_keeps_typed_floats() {
        let values = flat([("mute", Scalar::Float(0.0)), ("gain", Scalar::from("0"))]);
        let fragment = expand(&values, "").unwrap();
        assert_eq!(fragment["mute"], leaf(0.0));
        assert_eq!(fragment["gain"], leaf(0));
    }

    #[test]
    fn test_expand_branch_replaces_earlier_leaf() {
        let values = flat([("a", Scalar::Int(1)), ("a/b", Scalar::Int(2))]);
        let fragment = expand(&values, "").unwrap();
        assert_eq!(fragment, branch([("a", Node::Branch(branch([("b", leaf(2))])))]));
    }

    #[test]
    fn test_merge_is_non_destructive() {
        let mut original = branch([(
            "chan",
            Node::Branch(branch([
                ("name", leaf("oldName")),
                ("defaultName", leaf("defaultName")),
            ])),
        )]);
        let updates = branch([("chan", Node::Branch(branch([("name", leaf("newName"))])))]);

        merge(&mut original, updates);

        assert_eq!(
            original,
            branch([(
                "chan",
                Node::Branch(branch([
                    ("name", leaf("newName")),
                    ("defaultName", leaf("defaultName")),
                ])),
            )])
        );
    }

    #[test]
    fn test_merge_leaf_replaces_branch() {
        let mut original = branch([("a", Node::Branch(branch([("y", leaf(2))])))]);
        merge(&mut original, branch([("a", leaf(5))]));
        assert_eq!(original, branch([("a", leaf(5))]));

        merge(&mut original, branch([("a", Node::Branch(branch([("z", leaf(1))])))]));
        assert_eq!(original, branch([("a", Node::Branch(branch([("z", leaf(1))])))]));
    }

    #[test]
    fn test_view_navigation() {
        let root = branch([(
            "mix",
            Node::Branch(branch([("fader", leaf(1.0)), ("name", leaf("Main"))])),
        )]);

        assert_eq!(view(&root, "mix/fader"), flat([("value", Scalar::Float(1.0))]));
        assert_eq!(view(&root, "/mix/"), view(&root, "mix"));
        assert_eq!(view(&root, "").len(), 2);
        assert!(view(&root, "missing/path").is_empty());
        assert!(view(&root, "mix/fader/deeper").is_empty());
    }

    fn arb_scalar() -> impl Strategy<Value = Scalar> {
        prop_oneof![
            any::<i64>().prop_map(Scalar::Int),
            (-1.0e6f64..1.0e6).prop_map(Scalar::Float),
            "[a-m][a-m ]{0,8}".prop_map(Scalar::Text),
        ]
    }

    fn arb_tree() -> impl Strategy<Value = Branch> {
        let leaf = arb_scalar().prop_map(Node::Leaf);
        let node = leaf.prop_recursive(4, 32, 4, |inner| {
            prop::collection::btree_map("[a-k0-9]{1,4}", inner, 1..4).prop_map(Node::Branch)
        });
        prop::collection::btree_map("[a-k0-9]{1,4}", node, 0..4)
    }

    proptest! {
        #[test]
        fn prop_flatten_expand_round_trip(tree in arb_tree()) {
            let flat = flatten_branch(&tree);
            let rebuilt = expand(&flat, "").unwrap();
            prop_assert_eq!(rebuilt, tree);
        }
    }
}
