//! Equality saturation over semiring expressions.
//!
//! Equivalence classes of e-nodes (an operator label plus ordered child
//! class ids), a union-find over class ids, a hash-cons table for
//! deduplication, and a parent index driving incremental congruence repair.
//! Saturation applies rewrite rules up to congruence; enumeration pulls
//! concrete expressions back out of a class.
//!
//! All mutation is single-threaded by design: the union-find, hash-cons
//! table, and parent index are updated as a coordinated unit. `rewrite` has
//! no termination guarantee on its own and enumeration is combinatorial, so
//! both carry caller-controlled bounds (`saturate`'s iteration cap,
//! `generate`'s limit).

use crate::{
    error::Result,
    ids::ClassId,
    rules::Rule,
    typed_vec::TVec,
    types::{ConstValue, RelType},
    union_find::UnionFind,
    usr::{Expr, Subst, Var},
};
use hashbrown::HashMap;
use itertools::Itertools as _;
use std::collections::{BTreeMap, BTreeSet};
use std::mem;

/// Canonical operator tag of an e-node, carrying any leaf payload.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Label {
    One,
    Zero,
    Var(Var),
    Const(ConstValue),
    Left,
    Right,
    Mul,
    Add,
    Not,
    Squash,
    USum,
    Lambda,
    App,
    Relation { name: String, ty: RelType },
    Predicate { name: String },
    Function { name: String, ty: RelType },
}

impl Label {
    fn of(expr: &Expr) -> Label {
        match expr {
            Expr::One => Label::One,
            Expr::Zero => Label::Zero,
            Expr::Var(v) => Label::Var(v.clone()),
            Expr::Const(c) => Label::Const(c.clone()),
            Expr::Left(_) => Label::Left,
            Expr::Right(_) => Label::Right,
            Expr::Mul(..) => Label::Mul,
            Expr::Add(..) => Label::Add,
            Expr::Not(_) => Label::Not,
            Expr::Squash(_) => Label::Squash,
            Expr::USum(..) => Label::USum,
            Expr::Lambda(..) => Label::Lambda,
            Expr::App(..) => Label::App,
            Expr::Relation { name, ty, .. } => Label::Relation {
                name: name.clone(),
                ty: ty.clone(),
            },
            Expr::Predicate { name, .. } => Label::Predicate { name: name.clone() },
            Expr::Function { name, ty, .. } => Label::Function {
                name: name.clone(),
                ty: ty.clone(),
            },
        }
    }
}

/// A label plus ordered child class ids.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ENode {
    label: Label,
    children: Vec<ClassId>,
}

#[derive(Clone, Debug, Default)]
struct EClass {
    nodes: BTreeSet<ENode>,
}

/// Bindings produced by pattern matching: each pattern variable is bound to
/// the equivalence class it matched.
pub type MatchBindings = BTreeMap<Var, ClassId>;

#[derive(Debug, Default)]
pub struct EGraph {
    classes: TVec<ClassId, EClass>,
    parents: TVec<ClassId, BTreeSet<(ENode, ClassId)>>,
    node_lookup: HashMap<ENode, ClassId>,
    uf: UnionFind<ClassId>,
    worklist: BTreeSet<ClassId>,
    root: ClassId,
}

impl EGraph {
    /// An e-graph seeded with `base`; its class is the root for `generate`.
    #[must_use]
    pub fn new(base: &Expr) -> Self {
        let mut egraph = Self::default();
        egraph.root = egraph.insert(base);
        egraph
    }

    #[must_use]
    pub fn root(&self) -> ClassId {
        self.uf.find(self.root)
    }

    /// Number of currently visible equivalence classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.uf.roots().count()
    }

    /// The canonical class id for `id` under the current union-find.
    #[must_use]
    pub fn canonical(&self, id: ClassId) -> ClassId {
        self.uf.find(id)
    }

    /// Insert `expr`, memoizing children through [`EGraph::find`] and the
    /// node itself through the hash-cons table. Returns the owning class.
    pub fn insert(&mut self, expr: &Expr) -> ClassId {
        let children = expr
            .children()
            .iter()
            .map(|child| self.find(child))
            .collect();
        self.insert_node(Label::of(expr), children)
    }

    /// The class currently containing a node structurally matching `expr`,
    /// inserting it if absent. The structural search spans all visible
    /// classes, not just the hash-cons table, so expressions that became
    /// representable through earlier merges are found rather than duplicated.
    pub fn find(&mut self, expr: &Expr) -> ClassId {
        let label = Label::of(expr);
        let children: Vec<ClassId> = expr
            .children()
            .iter()
            .map(|child| self.find(child))
            .collect();
        let roots: Vec<ClassId> = self.uf.roots().collect();
        for class in roots {
            let found = self.classes[class].nodes.iter().any(|node| {
                node.label == label
                    && node.children.len() == children.len()
                    && node
                        .children
                        .iter()
                        .zip(&children)
                        .all(|(a, b)| self.uf.find(*a) == *b)
            });
            if found {
                return class;
            }
        }
        self.insert_node(label, children)
    }

    fn insert_node(&mut self, label: Label, children: Vec<ClassId>) -> ClassId {
        let node = ENode { label, children };
        if let Some(&id) = self.node_lookup.get(&node) {
            return self.uf.find(id);
        }
        let id = self.uf.push();
        let class_id = self.classes.push(EClass {
            nodes: BTreeSet::from([node.clone()]),
        });
        debug_assert_eq!(id, class_id);
        let parent_id = self.parents.push(BTreeSet::new());
        debug_assert_eq!(id, parent_id);
        for &child in &node.children {
            self.parents[child].insert((node.clone(), id));
        }
        self.node_lookup.insert(node, id);
        id
    }

    /// Union two classes. The surviving root absorbs the other class's node
    /// set and parent set and is scheduled for congruence repair.
    pub fn merge(&mut self, a: ClassId, b: ClassId) -> ClassId {
        let (root, uprooted) = self.uf.union(a, b);
        if let Some(up) = uprooted {
            tracing::trace!("merge {up} into {root}");
            let nodes = mem::take(&mut self.classes[up].nodes);
            self.classes[root].nodes.extend(nodes);
            let parents = mem::take(&mut self.parents[up]);
            self.parents[root].extend(parents);
            self.worklist.insert(root);
        }
        root
    }

    /// Drain the repair worklist to a congruence fixed point: canonicalize
    /// every recorded parent of each dirty class, and merge the owners of any
    /// two parents that canonicalize to the same node (equal arguments imply
    /// equal results). Repairs can trigger further merges transitively.
    pub fn rebuild(&mut self) {
        while let Some(&class) = self.worklist.iter().next() {
            self.worklist.remove(&class);
            let class = self.uf.find(class);
            self.repair(class);
        }
    }

    fn repair(&mut self, class: ClassId) {
        let old_parents: Vec<(ENode, ClassId)> =
            mem::take(&mut self.parents[class]).into_iter().collect();
        for (node, _) in &old_parents {
            self.node_lookup.remove(node);
        }
        let mut new_parents: BTreeMap<ENode, ClassId> = BTreeMap::new();
        for (node, owner) in old_parents {
            let canonical = self.canonical_node(&node);
            let mut owner = self.uf.find(owner);
            if let Some(&previous) = new_parents.get(&canonical) {
                let previous = self.uf.find(previous);
                if previous != owner {
                    owner = self.merge(previous, owner);
                }
            }
            self.node_lookup.insert(canonical.clone(), owner);
            new_parents.insert(canonical, owner);
        }
        let target = self.uf.find(class);
        self.parents[target].extend(new_parents);
    }

    fn canonical_node(&self, node: &ENode) -> ENode {
        ENode {
            label: node.label.clone(),
            children: node.children.iter().map(|&c| self.uf.find(c)).collect(),
        }
    }

    /// Match `pattern` against one class. A pattern variable binds the whole
    /// class (or must agree with its earlier binding); any other pattern node
    /// must match an e-node's label exactly and recursively match each child.
    ///
    /// The first successfully matching e-node per class wins; there is no
    /// backtracking across sibling e-nodes, so a match can be missed when a
    /// binding chosen early conflicts further along the pattern.
    #[must_use]
    pub fn match_at_class(
        &self,
        class: ClassId,
        pattern: &Expr,
        bindings: MatchBindings,
    ) -> Option<MatchBindings> {
        if let Expr::Var(v) = pattern {
            return match bindings.get(v) {
                Some(&bound) if self.uf.find(bound) == class => Some(bindings),
                Some(_) => None,
                None => {
                    let mut bindings = bindings;
                    bindings.insert(v.clone(), class);
                    Some(bindings)
                }
            };
        }
        self.classes[class]
            .nodes
            .iter()
            .find_map(|node| self.match_at_node(node, pattern, bindings.clone()))
    }

    fn match_at_node(
        &self,
        node: &ENode,
        pattern: &Expr,
        bindings: MatchBindings,
    ) -> Option<MatchBindings> {
        if node.label != Label::of(pattern) {
            return None;
        }
        let children = pattern.children();
        if children.len() != node.children.len() {
            return None;
        }
        let mut bindings = bindings;
        for (child_pattern, &child_class) in children.iter().zip(&node.children) {
            bindings = self.match_at_class(self.uf.find(child_class), child_pattern, bindings)?;
        }
        Some(bindings)
    }

    /// Apply one rule across every visible class: match its left-hand side,
    /// strictly instantiate its right-hand side with representative
    /// expressions of the bound classes, and merge. Ends with a full
    /// [`EGraph::rebuild`]. Returns the number of merges performed.
    ///
    /// A rule whose right-hand side mentions a variable the match did not
    /// bind fails loudly with `UnboundVariable`.
    pub fn rewrite(&mut self, rule: &Rule) -> Result<usize> {
        let mut merges = 0;
        for class in self.uf.roots().collect::<Vec<_>>() {
            if self.uf.find(class) != class {
                // merged away earlier in this pass
                continue;
            }
            let Some(bindings) = self.match_at_class(class, &rule.lhs, MatchBindings::new())
            else {
                continue;
            };
            let Some(subst) = self.concretize(&bindings) else {
                continue;
            };
            let new_term = rule.rhs.instantiated(&subst)?;
            let new_class = self.find(&new_term);
            if self.uf.find(class) != self.uf.find(new_class) {
                merges += 1;
                let _root = self.merge(class, new_class);
            }
        }
        if merges > 0 {
            tracing::debug!(rule = rule.name, merges, "rewrite");
        }
        self.rebuild();
        Ok(merges)
    }

    /// Turn class bindings into concrete representative expressions. Any
    /// representative is sound (all members of a class are equal); the
    /// ordered node sets make the choice deterministic.
    fn concretize(&self, bindings: &MatchBindings) -> Option<Subst> {
        let mut subst = Subst::new();
        for (var, &class) in bindings {
            let class = self.uf.find(class);
            let repr = self.exprs_in(class, 1, &mut Vec::new()).into_iter().next()?;
            subst.insert(var.clone(), repr);
        }
        Some(subst)
    }

    /// Apply the rule set repeatedly until a full pass performs no merge or
    /// `max_iters` passes have run. Returns the total number of merges.
    pub fn saturate(&mut self, rules: &[Rule], max_iters: usize) -> Result<usize> {
        let mut total = 0;
        for iteration in 0..max_iters {
            let mut merges = 0;
            for rule in rules {
                merges += self.rewrite(rule)?;
            }
            total += merges;
            tracing::debug!(iteration, merges, "saturation pass");
            if merges == 0 {
                break;
            }
        }
        Ok(total)
    }

    /// Enumerate up to `limit` distinct expressions represented by the root
    /// class: per e-node the cross product of its children's enumerations,
    /// unioned across the e-nodes of a class. E-nodes that re-enter a class
    /// already on the recursion path are skipped, so merged (cyclic) classes
    /// enumerate their finite unrollings instead of diverging.
    #[must_use]
    pub fn generate(&self, limit: usize) -> Vec<Expr> {
        self.exprs_in(self.root(), limit, &mut Vec::new())
    }

    fn exprs_in(&self, class: ClassId, limit: usize, path: &mut Vec<ClassId>) -> Vec<Expr> {
        if limit == 0 || path.contains(&class) {
            return Vec::new();
        }
        path.push(class);
        let mut out: Vec<Expr> = Vec::new();
        for node in &self.classes[class].nodes {
            if out.len() >= limit {
                break;
            }
            out.extend(self.exprs_of_node(node, limit - out.len(), path));
        }
        path.pop();
        out.into_iter().unique().take(limit).collect()
    }

    fn exprs_of_node(&self, node: &ENode, limit: usize, path: &mut Vec<ClassId>) -> Vec<Expr> {
        if node.children.is_empty() {
            return expr_from(&node.label, Vec::new()).into_iter().collect();
        }
        let child_exprs: Vec<Vec<Expr>> = node
            .children
            .iter()
            .map(|&child| self.exprs_in(self.uf.find(child), limit, path))
            .collect();
        if child_exprs.iter().any(Vec::is_empty) {
            return Vec::new();
        }
        child_exprs
            .into_iter()
            .multi_cartesian_product()
            .take(limit)
            .filter_map(|parts| expr_from(&node.label, parts))
            .collect()
    }
}

/// Rebuild a concrete expression from a label and child expressions. Returns
/// `None` when a merged class put a non-binder where a binder variable must
/// go (e.g. the first child of a `USum` is not a variable).
fn expr_from(label: &Label, parts: Vec<Expr>) -> Option<Expr> {
    Some(match label {
        Label::One => Expr::One,
        Label::Zero => Expr::Zero,
        Label::Var(v) => Expr::Var(v.clone()),
        Label::Const(c) => Expr::Const(c.clone()),
        Label::Left => {
            let [inner]: [Expr; 1] = parts.try_into().ok()?;
            Expr::left(inner)
        }
        Label::Right => {
            let [inner]: [Expr; 1] = parts.try_into().ok()?;
            Expr::right(inner)
        }
        Label::Not => {
            let [inner]: [Expr; 1] = parts.try_into().ok()?;
            Expr::not(inner)
        }
        Label::Squash => {
            let [inner]: [Expr; 1] = parts.try_into().ok()?;
            Expr::squash(inner)
        }
        Label::Mul => {
            let [l, r]: [Expr; 2] = parts.try_into().ok()?;
            Expr::mul(l, r)
        }
        Label::Add => {
            let [l, r]: [Expr; 2] = parts.try_into().ok()?;
            Expr::add(l, r)
        }
        Label::App => {
            let [fun, arg]: [Expr; 2] = parts.try_into().ok()?;
            Expr::App(Box::new(fun), Box::new(arg))
        }
        Label::USum => {
            let [binder, body]: [Expr; 2] = parts.try_into().ok()?;
            let Expr::Var(var) = binder else { return None };
            Expr::usum(var, body)
        }
        Label::Lambda => {
            let [binder, body]: [Expr; 2] = parts.try_into().ok()?;
            let Expr::Var(var) = binder else { return None };
            Expr::Lambda(var, Box::new(body))
        }
        Label::Relation { name, ty } => {
            let [arg]: [Expr; 1] = parts.try_into().ok()?;
            Expr::Relation {
                name: name.clone(),
                ty: ty.clone(),
                arg: Box::new(arg),
            }
        }
        Label::Predicate { name } => Expr::Predicate {
            name: name.clone(),
            args: parts,
        },
        Label::Function { name, ty } => Expr::Function {
            name: name.clone(),
            ty: ty.clone(),
            args: parts,
        },
    })
}
