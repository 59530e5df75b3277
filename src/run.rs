use log::*;

use crate::util::{Duration, Instant};
use crate::{EGraph, Id, Rewrite};

/// Why a [`Runner`] stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// An iteration found nothing new: no fresh classes, no merges.
    Saturated,
    /// The iteration limit was hit. The data is the iteration limit.
    IterationLimit(usize),
    /// The enode limit was hit. The data is the enode limit.
    NodeLimit(usize),
    /// The time limit was hit. The data is the time limit in seconds.
    TimeLimit(f64),
    /// A hook asked to stop.
    Other(String),
}

/// Data recorded about one saturation iteration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Iteration {
    /// Enodes in the egraph at the start of this iteration.
    pub egraph_nodes: usize,
    /// Eclasses in the egraph at the start of this iteration.
    pub egraph_classes: usize,
    /// Matches found per rule, in rule order.
    pub matches: Vec<usize>,
    /// Merges that changed the graph while applying.
    pub applied: usize,
    /// Unions performed by the rebuild.
    pub rebuild_unions: usize,
    pub search_time: f64,
    pub apply_time: f64,
    pub rebuild_time: f64,
}

/// The equality-saturation driver.
///
/// Matching runs against a snapshot of the pre-iteration graph: every rule's
/// matches are collected before any of them is applied, so rewrites
/// introduced this iteration are only seen by the next one. `rebuild` runs
/// exactly once per iteration, so observers between iterations always see a
/// congruence-closed graph.
///
/// Configured builder-style:
///
/// ```
/// # use circuitry::*;
/// let runner = Runner::default()
///     .with_iter_limit(8)
///     .with_node_limit(10_000);
/// ```
pub struct Runner {
    /// The e-graph being saturated.
    pub egraph: EGraph,
    /// Roots registered via [`with_root`](Runner::with_root), canonicalized
    /// on access via `find`.
    pub roots: Vec<Id>,
    /// Per-iteration statistics.
    pub iterations: Vec<Iteration>,
    /// Set once the runner stops.
    pub stop_reason: Option<StopReason>,

    /// Hooks run at the top of every iteration; an `Err` stops the run.
    #[allow(clippy::type_complexity)]
    pub hooks: Vec<Box<dyn FnMut(&mut EGraph) -> Result<(), String>>>,

    iter_limit: usize,
    node_limit: usize,
    time_limit: Duration,
    start_time: Option<Instant>,
}

impl Default for Runner {
    fn default() -> Self {
        Runner {
            egraph: EGraph::default(),
            roots: vec![],
            iterations: vec![],
            stop_reason: None,
            hooks: vec![],
            iter_limit: 30,
            node_limit: 10_000,
            time_limit: Duration::from_secs(5),
            start_time: None,
        }
    }
}

impl Runner {
    /// Sets the iteration limit. Default: 30
    pub fn with_iter_limit(self, iter_limit: usize) -> Self {
        Self { iter_limit, ..self }
    }

    /// Sets the egraph size limit (in enodes). Default: 10,000
    pub fn with_node_limit(self, node_limit: usize) -> Self {
        Self { node_limit, ..self }
    }

    /// Sets the runner time limit. Default: 5 seconds
    pub fn with_time_limit(self, time_limit: Duration) -> Self {
        Self { time_limit, ..self }
    }

    /// Replaces the e-graph of this runner.
    pub fn with_egraph(self, egraph: EGraph) -> Self {
        Self { egraph, ..self }
    }

    /// Registers a root to keep track of across merges.
    pub fn with_root(mut self, root: Id) -> Self {
        self.roots.push(root);
        self
    }

    /// Adds a hook run between iterations; returning `Err` stops the run
    /// with [`StopReason::Other`]. This is the place for a deadline or
    /// cancellation check.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut EGraph) -> Result<(), String> + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Whether the run ended because the rules were exhausted rather than a
    /// budget.
    pub fn is_saturated(&self) -> bool {
        matches!(self.stop_reason, Some(StopReason::Saturated))
    }

    /// Runs to saturation or until a budget is exhausted. Afterwards,
    /// `stop_reason` is guaranteed to be set; on budget exhaustion the
    /// e-graph is left in its current (rebuilt) state.
    pub fn run(mut self, rules: &[Rewrite]) -> Self {
        self.start_time.get_or_insert_with(Instant::now);
        self.egraph.rebuild();

        loop {
            if let Err(reason) = self.check_limits() {
                info!("stopping: {:?}", reason);
                self.stop_reason = Some(reason);
                break;
            }
            if let Err(reason) = self.run_hooks() {
                info!("stopping: {:?}", reason);
                self.stop_reason = Some(reason);
                break;
            }
            if self.run_one(rules) {
                info!("saturated after {} iterations", self.iterations.len());
                self.stop_reason = Some(StopReason::Saturated);
                break;
            }
        }
        self
    }

    /// One iteration: snapshot-search every rule, apply every match, rebuild.
    /// Returns `true` if nothing changed.
    fn run_one(&mut self, rules: &[Rewrite]) -> bool {
        let i = self.iterations.len();
        debug!("iteration {}", i);

        let egraph_nodes = self.egraph.total_number_of_nodes();
        let egraph_classes = self.egraph.number_of_classes();
        let (unions_before, classes_before) = self.egraph.progress();

        let search_start = Instant::now();
        let matches: Vec<_> = rules.iter().map(|rule| rule.search(&self.egraph)).collect();
        let search_time = search_start.elapsed().as_secs_f64();

        let apply_start = Instant::now();
        let mut applied = 0;
        for (rule, ms) in rules.iter().zip(&matches) {
            applied += rule.apply(&mut self.egraph, ms);
        }
        let apply_time = apply_start.elapsed().as_secs_f64();

        let rebuild_start = Instant::now();
        let rebuild_unions = self.egraph.rebuild();
        let rebuild_time = rebuild_start.elapsed().as_secs_f64();

        let (unions_after, classes_after) = self.egraph.progress();
        let saturated = unions_after == unions_before && classes_after == classes_before;

        info!(
            "iteration {}: {} nodes, {} classes, {} applied, {} rebuild unions",
            i,
            self.egraph.total_number_of_nodes(),
            self.egraph.number_of_classes(),
            applied,
            rebuild_unions
        );

        self.iterations.push(Iteration {
            egraph_nodes,
            egraph_classes,
            matches: matches.iter().map(|m| m.len()).collect(),
            applied,
            rebuild_unions,
            search_time,
            apply_time,
            rebuild_time,
        });

        saturated
    }

    fn run_hooks(&mut self) -> Result<(), StopReason> {
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = hooks
            .iter_mut()
            .try_for_each(|hook| hook(&mut self.egraph).map_err(StopReason::Other));
        self.hooks = hooks;
        result
    }

    fn check_limits(&self) -> Result<(), StopReason> {
        let elapsed = self.start_time.unwrap().elapsed();
        if elapsed > self.time_limit {
            return Err(StopReason::TimeLimit(elapsed.as_secs_f64()));
        }
        let size = self.egraph.total_number_of_nodes();
        if size > self.node_limit {
            return Err(StopReason::NodeLimit(size));
        }
        if self.iterations.len() >= self.iter_limit {
            return Err(StopReason::IterationLimit(self.iterations.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::OpKind;
    use crate::pattern::parse_rules;
    use crate::CircNode;

    #[test]
    fn saturates_on_a_finite_rule_set() {
        let mut eg = EGraph::default();
        let five = eg.add(CircNode::constant(5, 64));
        let zero = eg.add(CircNode::constant(0, 64));
        let add = eg.add(CircNode::new(OpKind::Add, 64, [five, zero]));

        let rules = parse_rules("(rule (add ?x 0) ?x)").unwrap();
        let runner = Runner::default().with_egraph(eg).with_root(add).run(&rules);

        assert!(runner.is_saturated());
        assert_eq!(runner.egraph.find(add), runner.egraph.find(five));
    }

    #[test]
    fn one_more_iteration_after_saturation_changes_nothing() {
        let mut eg = EGraph::default();
        let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 64));
        let xor = eg.add(CircNode::new(OpKind::Xor, 64, [a, a]));

        let rules = parse_rules("(rule (xor ?x ?x) 0)").unwrap();
        let runner = Runner::default().with_egraph(eg).with_root(xor).run(&rules);
        assert!(runner.is_saturated());

        let (unions, classes) = runner.egraph.progress();
        let rerun = Runner::default().with_egraph(runner.egraph).run(&rules);
        assert_eq!(rerun.egraph.progress(), (unions, classes));
    }

    #[test]
    fn iteration_budget_is_reported() {
        let mut eg = EGraph::default();
        let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 64));
        let b = eg.add(CircNode::leaf(OpKind::InputRegister("rbx".into()), 64));
        let _ = eg.add(CircNode::new(OpKind::Add, 64, [a, b]));

        // commutativity never saturates the counter heuristics to zero fast,
        // so a tiny budget must trip first
        let rules = parse_rules("(rule (add ?x ?y) (add ?y ?x))").unwrap();
        let runner = Runner::default()
            .with_egraph(eg)
            .with_iter_limit(2)
            .run(&rules);
        match runner.stop_reason {
            Some(StopReason::IterationLimit(2)) | Some(StopReason::Saturated) => {}
            other => panic!("unexpected stop reason {:?}", other),
        }
    }
}
