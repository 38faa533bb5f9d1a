//! Rendering of deferred values.
//!
//! The resolver turns a [`Value`] into plain JSON in the context of one
//! stack. References become `Ref` / `Fn::GetAtt` objects keyed by logical
//! id, joins become `Fn::Join` (or collapse to plain strings when every
//! part is known), token strings are split and rendered as joins, and lazy
//! values are produced from the tree. Every referenced resource is recorded
//! so the caller can derive implicit dependencies.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value as Json, json};
use stratus_common::constants::MAX_LAZY_DEPTH;
use stratus_common::error::{Result, StratusError};
use stratus_common::types::LogicalId;

use crate::lexer::{self, Fragment};
use crate::token::Value;
use crate::tree::{ConstructTree, NodeId};

/// Resolves values for one stack.
#[derive(Debug)]
pub struct Resolver<'a> {
    tree: &'a ConstructTree,
    stack: NodeId,
    logical_ids: &'a BTreeMap<NodeId, LogicalId>,
    references: BTreeSet<NodeId>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver for `stack` using its allocated logical ids.
    #[must_use]
    pub const fn new(
        tree: &'a ConstructTree,
        stack: NodeId,
        logical_ids: &'a BTreeMap<NodeId, LogicalId>,
    ) -> Self {
        Self {
            tree,
            stack,
            logical_ids,
            references: BTreeSet::new(),
        }
    }

    /// Resolves a value. Absent values resolve to `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference targets something that is not a
    /// resource of this stack, a token is unknown, or lazy values and
    /// token strings expand into each other too deeply. Plain lists, maps
    /// and joins may nest arbitrarily.
    pub fn resolve(&mut self, value: &Value) -> Result<Option<Json>> {
        self.resolve_at(value, 0)
    }

    /// Returns and clears the resources referenced so far.
    pub fn take_references(&mut self) -> BTreeSet<NodeId> {
        std::mem::take(&mut self.references)
    }

    fn resolve_at(&mut self, value: &Value, depth: usize) -> Result<Option<Json>> {
        if depth > MAX_LAZY_DEPTH {
            return Err(StratusError::ResolutionDepthExceeded { limit: MAX_LAZY_DEPTH });
        }

        let json = match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) if lexer::contains_token(s) => {
                return self.resolve_token_string(s, depth + 1);
            }
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(json) = self.resolve_at(item, depth)? {
                        out.push(json);
                    }
                }
                Json::Array(out)
            }
            Value::Map(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    if let Some(json) = self.resolve_at(item, depth)? {
                        let _ = out.insert(key.clone(), json);
                    }
                }
                Json::Object(out)
            }
            Value::Ref(target) => {
                let id = self.reference(*target)?;
                json!({ "Ref": id.as_str() })
            }
            Value::GetAtt(target, attribute) => {
                let id = self.reference(*target)?;
                json!({ "Fn::GetAtt": [id.as_str(), attribute] })
            }
            Value::Join(separator, parts) => return self.resolve_join(separator, parts, depth),
            Value::Lazy(lazy) => {
                let produced = lazy.produce(self.tree);
                return self.resolve_at(&produced, depth + 1);
            }
        };
        Ok(Some(json))
    }

    fn resolve_token_string(&mut self, input: &str, depth: usize) -> Result<Option<Json>> {
        let parts = lexer::split_tokens(input)?
            .into_iter()
            .map(|fragment| match fragment {
                Fragment::Literal(text) => Ok(Value::String(text.to_string())),
                Fragment::Token(index) => self.tree.lookup_token(index).cloned().ok_or_else(|| {
                    StratusError::UnresolvedToken {
                        token: format!("token #{index} in \"{input}\""),
                    }
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        self.resolve_join("", &parts, depth)
    }

    fn resolve_join(&mut self, separator: &str, parts: &[Value], depth: usize) -> Result<Option<Json>> {
        let mut rendered: Vec<Json> = Vec::with_capacity(parts.len());
        for part in parts {
            let Some(json) = self.resolve_at(part, depth)? else {
                continue;
            };
            match nested_join(&json, separator) {
                Some(inner) => rendered.extend(inner.iter().cloned()),
                None => rendered.push(json),
            }
        }

        let merged = merge_literals(rendered, separator);
        Ok(Some(match merged.as_slice() {
            [] => Json::String(String::new()),
            [single] => single.clone(),
            _ => json!({ "Fn::Join": [separator, merged] }),
        }))
    }

    fn reference(&mut self, target: NodeId) -> Result<LogicalId> {
        if self.tree.resource(target).is_none() {
            return Err(StratusError::NotFound {
                kind: "resource",
                id: format!("reference target {} is not a resource", self.tree.path(target)),
            });
        }

        let target_stack = self.tree.stack_of(target);
        if target_stack != Some(self.stack) {
            let name = |stack: Option<NodeId>| {
                stack
                    .and_then(|s| self.tree.stack_info(s))
                    .map_or_else(String::new, |info| info.name.clone())
            };
            return Err(StratusError::CrossStackReference {
                from_stack: name(Some(self.stack)),
                to_stack: name(target_stack),
                target: self.tree.path(target),
            });
        }

        let id = self
            .logical_ids
            .get(&target)
            .cloned()
            .ok_or_else(|| StratusError::NotFound {
                kind: "logical id",
                id: self.tree.path(target),
            })?;
        let _ = self.references.insert(target);
        Ok(id)
    }
}

/// Returns the parts of `json` if it is a join with the same separator.
fn nested_join<'j>(json: &'j Json, separator: &str) -> Option<&'j Vec<Json>> {
    let args = json.get("Fn::Join")?.as_array()?;
    match args.as_slice() {
        [Json::String(sep), Json::Array(parts)] if sep == separator => Some(parts),
        _ => None,
    }
}

/// Merges runs of adjacent string literals, keeping the separator between them.
fn merge_literals(parts: Vec<Json>, separator: &str) -> Vec<Json> {
    let mut merged: Vec<Json> = Vec::with_capacity(parts.len());
    for part in parts {
        if let (Some(Json::String(prev)), Json::String(next)) = (merged.last_mut(), &part) {
            prev.push_str(separator);
            prev.push_str(next);
            continue;
        }
        merged.push(part);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Resource, StackProps};

    struct Fixture {
        tree: ConstructTree,
        stack: NodeId,
        lb: NodeId,
        ids: BTreeMap<NodeId, LogicalId>,
    }

    fn fixture() -> Fixture {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        let lb = tree
            .add_resource(stack, "LB", Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer"))
            .expect("lb");
        let mut ids = BTreeMap::new();
        let _ = ids.insert(lb, LogicalId::new("LB"));
        Fixture { tree, stack, lb, ids }
    }

    #[test]
    fn literals_pass_through() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::object([
            ("Port", Value::from(443_u16)),
            ("Enabled", true.into()),
            ("Name", "web".into()),
        ]);
        let json = resolver.resolve(&value).expect("resolve").expect("present");
        assert_eq!(json, json!({"Port": 443, "Enabled": true, "Name": "web"}));
        assert!(resolver.take_references().is_empty());
    }

    #[test]
    fn nulls_are_omitted() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::object([("Kept", Value::from("x")), ("Gone", Value::Null)]);
        let json = resolver.resolve(&value).expect("resolve").expect("present");
        assert_eq!(json, json!({"Kept": "x"}));
        assert!(resolver.resolve(&Value::Null).expect("resolve").is_none());
        let list = Value::List(vec![Value::Null, "a".into()]);
        assert_eq!(resolver.resolve(&list).expect("resolve"), Some(json!(["a"])));
    }

    #[test]
    fn references_render_and_are_recorded() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::List(vec![Value::Ref(f.lb), Value::get_att(f.lb, "DNSName")]);
        let json = resolver.resolve(&value).expect("resolve").expect("present");
        assert_eq!(
            json,
            json!([{"Ref": "LB"}, {"Fn::GetAtt": ["LB", "DNSName"]}])
        );
        let refs = resolver.take_references();
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![f.lb]);
    }

    #[test]
    fn all_literal_join_collapses() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::join("-", vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(resolver.resolve(&value).expect("resolve"), Some(json!("a-b-c")));
    }

    #[test]
    fn mixed_join_merges_adjacent_literals() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::join(
            "",
            vec!["https".into(), "://".into(), Value::get_att(f.lb, "DNSName")],
        );
        assert_eq!(
            resolver.resolve(&value).expect("resolve"),
            Some(json!({"Fn::Join": ["", ["https://", {"Fn::GetAtt": ["LB", "DNSName"]}]]}))
        );
    }

    #[test]
    fn single_part_join_collapses_to_the_part() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::join("", vec![Value::Ref(f.lb)]);
        assert_eq!(resolver.resolve(&value).expect("resolve"), Some(json!({"Ref": "LB"})));
    }

    #[test]
    fn token_strings_become_joins() {
        let mut f = fixture();
        let token = f.tree.token_string(Value::get_att(f.lb, "DNSName"));
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);

        let bare = resolver.resolve(&Value::String(token.clone())).expect("resolve");
        assert_eq!(bare, Some(json!({"Fn::GetAtt": ["LB", "DNSName"]})));

        let url = Value::String(format!("http://{token}/"));
        assert_eq!(
            resolver.resolve(&url).expect("resolve"),
            Some(json!({"Fn::Join": ["", ["http://", {"Fn::GetAtt": ["LB", "DNSName"]}, "/"]]}))
        );
    }

    #[test]
    fn nested_token_strings_flatten() {
        let mut f = fixture();
        let dns = f.tree.token_string(Value::get_att(f.lb, "DNSName"));
        let alias = f.tree.token_string(Value::String(format!("dualstack.{dns}")));
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::String(format!("https://{alias}"));
        assert_eq!(
            resolver.resolve(&value).expect("resolve"),
            Some(json!({"Fn::Join": ["", ["https://dualstack.", {"Fn::GetAtt": ["LB", "DNSName"]}]]}))
        );
    }

    #[test]
    fn unknown_token_fails() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let err = resolver
            .resolve(&Value::String("${Token[X.99]}".into()))
            .unwrap_err();
        assert!(matches!(err, StratusError::UnresolvedToken { .. }), "got: {err}");
    }

    #[test]
    fn lazy_values_see_the_tree() {
        let f = fixture();
        let lb = f.lb;
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let value = Value::lazy(move |tree| Value::from(tree.id(lb).to_string()));
        assert_eq!(resolver.resolve(&value).expect("resolve"), Some(json!("LB")));
    }

    #[test]
    fn runaway_lazy_values_are_stopped() {
        fn endless(_: &ConstructTree) -> Value {
            Value::lazy(endless)
        }
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let err = resolver.resolve(&Value::lazy(endless)).unwrap_err();
        assert!(
            matches!(err, StratusError::ResolutionDepthExceeded { limit: MAX_LAZY_DEPTH }),
            "got: {err}"
        );
    }

    #[test]
    fn deeply_nested_literals_resolve() {
        let f = fixture();
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let mut value = Value::from("core");
        let mut expected = json!("core");
        for _ in 0..(MAX_LAZY_DEPTH + 8) {
            value = Value::List(vec![value]);
            expected = json!([expected]);
        }
        value = Value::object([("Nested", value)]);
        let json = resolver.resolve(&value).expect("resolve").expect("present");
        assert_eq!(json, json!({ "Nested": expected }));
    }

    #[test]
    fn lazy_values_inside_deep_literals_resolve() {
        let f = fixture();
        let lb = f.lb;
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let mut value = Value::lazy(move |_| Value::Ref(lb));
        for _ in 0..(MAX_LAZY_DEPTH + 1) {
            value = Value::join("-", vec![value]);
        }
        let json = resolver.resolve(&value).expect("resolve").expect("present");
        assert_eq!(json, json!({ "Ref": "LB" }));
        assert_eq!(resolver.take_references().len(), 1);
    }

    #[test]
    fn cross_stack_reference_fails() {
        let mut f = fixture();
        let other = f.tree.add_stack("Other", StackProps::default()).expect("stack");
        let bucket = f
            .tree
            .add_resource(other, "Bucket", Resource::new("AWS::S3::Bucket"))
            .expect("bucket");
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let err = resolver.resolve(&Value::Ref(bucket)).unwrap_err();
        assert!(matches!(err, StratusError::CrossStackReference { .. }), "got: {err}");
    }

    #[test]
    fn reference_to_scope_fails() {
        let mut f = fixture();
        let scope = f.tree.add_scope(f.stack, "Group").expect("scope");
        let mut resolver = Resolver::new(&f.tree, f.stack, &f.ids);
        let err = resolver.resolve(&Value::Ref(scope)).unwrap_err();
        assert!(err.to_string().contains("not a resource"), "got: {err}");
    }
}
