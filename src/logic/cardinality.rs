//! Incremental totalizer encoding for "at most k" constraints.
//!
//! The totalizer is a binary tree over the input literals. Each node carries
//! unary count outputs `o_1..o_m` with `o_j` forced true whenever at least `j`
//! inputs below it are true. Outputs are only built up to the current bound;
//! raising the bound adds the missing outputs and their clauses while every
//! clause emitted before stays valid.

use super::solving::Literal;
use super::tseitin::VarPool;
use super::types::Clause;

#[derive(Debug, Clone)]
struct Node {
    /// Number of inputs below this node
    size: usize,
    /// `outputs[j - 1]` is the output `o_j`
    outputs: Vec<Literal>,
    children: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct Totalizer {
    nodes: Vec<Node>,
    root: usize,
    bound: usize,
}

impl Totalizer {
    /// Builds the tree skeleton. No clauses exist until [Totalizer::extend] is called.
    ///
    /// `inputs` must not be empty.
    pub fn new(inputs: &[Literal]) -> Self {
        assert!(!inputs.is_empty(), "totalizer needs at least one input");

        let mut totalizer = Self { nodes: Vec::with_capacity(2 * inputs.len()), root: 0, bound: 0 };
        totalizer.root = totalizer.build(inputs);
        totalizer
    }

    fn build(&mut self, inputs: &[Literal]) -> usize {
        let node = if let [lit] = inputs {
            Node { size: 1, outputs: vec![*lit], children: None }
        } else {
            let (left, right) = inputs.split_at(inputs.len() / 2);
            let left = self.build(left);
            let right = self.build(right);
            Node { size: inputs.len(), outputs: Vec::new(), children: Some((left, right)) }
        };
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn size(&self) -> usize {
        self.nodes[self.root].size
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Ensures outputs `o_1..o_bound` exist at the root, returning the clauses
    /// that have to be added to the oracle for them.
    pub fn extend<P: VarPool + ?Sized>(&mut self, bound: usize, pool: &mut P) -> Vec<Clause> {
        let mut clauses = Vec::new();
        if bound > self.bound {
            self.extend_node(self.root, bound, pool, &mut clauses);
            self.bound = bound;
        }
        clauses
    }

    fn extend_node<P: VarPool + ?Sized>(&mut self, idx: usize, bound: usize, pool: &mut P, clauses: &mut Vec<Clause>) {
        let Some((left, right)) = self.nodes[idx].children else {
            return;
        };

        self.extend_node(left, bound, pool, clauses);
        self.extend_node(right, bound, pool, clauses);

        let target = self.nodes[idx].size.min(bound);
        let built = self.nodes[idx].outputs.len();
        if built >= target {
            return;
        }

        let left_out = self.nodes[left].outputs.clone();
        let right_out = self.nodes[right].outputs.clone();

        for j in (built + 1)..=target {
            let out = pool.fresh();
            // a_i ∧ b_k ⇒ o_j for every split i + k = j
            for i in 0..=j.min(left_out.len()) {
                let k = j - i;
                if k > right_out.len() {
                    continue;
                }
                let mut lits = Vec::with_capacity(3);
                if i > 0 {
                    lits.push(-left_out[i - 1]);
                }
                if k > 0 {
                    lits.push(-right_out[k - 1]);
                }
                lits.push(out);
                clauses.push(Clause::from_vec(lits));
            }
            self.nodes[idx].outputs.push(out);
        }
    }

    /// The root output `o_j`, forced true when at least `j` inputs are true.
    pub fn output(&self, j: usize) -> Option<Literal> {
        if j == 0 {
            return None;
        }
        self.nodes[self.root].outputs.get(j - 1).copied()
    }

    /// Literal which, assumed true, allows at most `k` inputs to be true.
    /// `None` if the bound is trivial or its output has not been built yet.
    pub fn at_most(&self, k: usize) -> Option<Literal> {
        self.output(k + 1).map(|lit| -lit)
    }
}
