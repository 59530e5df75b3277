/*!
E-graph visualization with [GraphViz].

[GraphViz]: https://graphviz.gitlab.io/
!*/

use std::fmt::{self, Debug, Display, Formatter};
use std::io::{Result, Write};
use std::path::Path;

use crate::EGraph;

/// A wrapper for an [`EGraph`] that implements [`Display`] as a GraphViz
/// `digraph`, clustered by e-class.
///
/// Note that self-edges (from an enode to its containing eclass) will be
/// rendered improperly due to a deficiency in GraphViz.
pub struct Dot<'a> {
    egraph: &'a EGraph,
}

impl<'a> Dot<'a> {
    pub fn new(egraph: &EGraph) -> Dot<'_> {
        Dot { egraph }
    }

    /// Writes the `Dot` to a .dot file with the given filename.
    /// Does _not_ require a `dot` binary.
    pub fn to_dot(&self, filename: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(filename)?;
        write!(file, "{}", self)?;
        Ok(())
    }
}

impl<'a> Debug for Dot<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Dot({:?})", self.egraph)
    }
}

impl<'a> Display for Dot<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "digraph egraph {{")?;

        // set compound=true to enable edges to clusters
        writeln!(f, "  compound=true")?;
        writeln!(f, "  clusterrank=local")?;

        // define all the nodes, clustered by eclass
        for class in self.egraph.classes() {
            writeln!(f, "  subgraph cluster_{} {{", class.id)?;
            writeln!(f, "    style=dotted")?;
            for (i, node) in class.iter().enumerate() {
                writeln!(f, "    \"{}.{}\"[label = \"{}\"]", class.id, i, node)?;
            }
            writeln!(f, "  }}")?;
        }

        for class in self.egraph.classes() {
            for (i_in_class, node) in class.iter().enumerate() {
                for (arg_i, child) in node.children.iter().enumerate() {
                    // write the edge to the child, but clip it to the eclass with lhead
                    let child_leader = self.egraph.find(*child);

                    if child_leader == class.id {
                        writeln!(
                            f,
                            "  \"{}.{}\" -> \"{}.{}\":n [lhead = cluster_{}, label = {}]",
                            class.id, i_in_class, class.id, i_in_class, class.id, arg_i
                        )?;
                    } else {
                        writeln!(
                            f,
                            "  \"{}.{}\" -> \"{}.0\" [lhead = cluster_{}, label = {}]",
                            class.id, i_in_class, child_leader, child_leader, arg_i
                        )?;
                    }
                }
            }
        }

        write!(f, "}}")
    }
}
