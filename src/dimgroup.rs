//! Dimension-group parser (C8): splits the `dim_grouping` transform
//! parameter into an ordered set of groups, each mapping a contiguous run
//! of input dimensions onto a contiguous run of output dimensions, per
//! spec.md §4.8.
//!
//! Grounded on `cds_transform_driver.c`'s `parse_dim_grouping` (brace-group
//! scan, optional `:` input/output split, contiguity check, final sort by
//! input offset), reimplemented with a `pest` grammar in place of the
//! original's hand-rolled character walk - the teacher's own `pest`/
//! `pest_derive` dependency pair is the natural idiom for this here.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use thiserror::Error;

use crate::data_model::Variable;

#[derive(PestParser)]
#[grammar = "dimgroup.pest"]
struct DimGroupParser;

#[derive(Debug, Error)]
pub enum DimGroupError {
    #[error("could not parse dim_grouping string '{0}': {1}")]
    Syntax(String, String),
    #[error("dim_grouping references unknown {side} dimension '{name}' in group {group_index}")]
    UnknownDimension { side: &'static str, name: String, group_index: usize },
    #[error("group {0}'s {1} dimensions are not contiguous in the variable's dimension order")]
    NonContiguous(usize, &'static str),
    #[error("no dim_grouping given and input variable has {input_rank} dimensions but output has {output_rank}")]
    GroupCountMismatch { input_rank: usize, output_rank: usize },
    #[error("dim_grouping covers {covered} {side} dimension(s) but the variable has {expected}")]
    IncompleteCoverage { side: &'static str, covered: usize, expected: usize },
}

/// One dimension group: an ordered run of contiguous input dimensions
/// mapped onto an ordered run of contiguous output dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct DimGroup {
    pub input_dim_names: Vec<String>,
    pub output_dim_names: Vec<String>,
    pub input_length: usize,
    pub output_length: usize,
    pub input_offset: usize,
    pub output_offset: usize,
    /// Declaration order (brace order in the source string, or dimension
    /// order when no `dim_grouping` was given).
    pub order: usize,
}

fn dim_index(var: &Variable, name: &str) -> Option<usize> {
    var.dim_names.iter().position(|d| d == name)
}

fn contiguous_offset(
    var: &Variable,
    names: &[String],
    side: &'static str,
    group_index: usize,
) -> Result<usize, DimGroupError> {
    let mut indices = Vec::with_capacity(names.len());
    for name in names {
        let idx = dim_index(var, name)
            .ok_or_else(|| DimGroupError::UnknownDimension { side, name: name.clone(), group_index })?;
        indices.push(idx);
    }
    for w in indices.windows(2) {
        if w[1] != w[0] + 1 {
            return Err(DimGroupError::NonContiguous(group_index, side));
        }
    }
    Ok(indices[0])
}

fn group_length(var: &Variable, names: &[String]) -> usize {
    names.iter().map(|n| var.shape[dim_index(var, n).unwrap()]).product()
}

fn names_from_pair(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner().filter(|p| p.as_rule() == Rule::name).map(|p| p.as_str().to_string()).collect()
}

fn check_full_coverage(
    groups: &[DimGroup],
    input_var: &Variable,
    output_var: &Variable,
) -> Result<(), DimGroupError> {
    let covered_in: usize = groups.iter().map(|g| g.input_dim_names.len()).sum();
    if covered_in != input_var.rank() {
        return Err(DimGroupError::IncompleteCoverage {
            side: "input",
            covered: covered_in,
            expected: input_var.rank(),
        });
    }
    let covered_out: usize = groups.iter().map(|g| g.output_dim_names.len()).sum();
    if covered_out != output_var.rank() {
        return Err(DimGroupError::IncompleteCoverage {
            side: "output",
            covered: covered_out,
            expected: output_var.rank(),
        });
    }
    Ok(())
}

/// Parse `dim_grouping` (or synthesize the default one-group-per-dimension
/// split when `raw` is `None`, invariant 9) into groups sorted by
/// `input_offset`, each tagged with its declared `order`.
pub fn parse_dim_grouping(
    raw: Option<&str>,
    input_var: &Variable,
    output_var: &Variable,
) -> Result<Vec<DimGroup>, DimGroupError> {
    let groups = match raw {
        None => {
            if input_var.rank() != output_var.rank() {
                return Err(DimGroupError::GroupCountMismatch {
                    input_rank: input_var.rank(),
                    output_rank: output_var.rank(),
                });
            }
            (0..input_var.rank())
                .map(|i| DimGroup {
                    input_dim_names: vec![input_var.dim_names[i].clone()],
                    output_dim_names: vec![output_var.dim_names[i].clone()],
                    input_length: input_var.shape[i],
                    output_length: output_var.shape[i],
                    input_offset: i,
                    output_offset: i,
                    order: i,
                })
                .collect::<Vec<_>>()
        }
        Some(text) => {
            let mut pairs = DimGroupParser::parse(Rule::grouping, text)
                .map_err(|e| DimGroupError::Syntax(text.to_string(), e.to_string()))?;
            let grouping = pairs.next().ok_or_else(|| {
                DimGroupError::Syntax(text.to_string(), "empty dim_grouping".to_string())
            })?;

            let mut out = Vec::new();
            for (group_index, group_pair) in
                grouping.into_inner().filter(|p| p.as_rule() == Rule::group).enumerate()
            {
                let mut lists: Vec<Vec<String>> = group_pair
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::name_list)
                    .map(names_from_pair)
                    .collect();

                let input_names = lists.remove(0);
                let output_names = if lists.is_empty() { input_names.clone() } else { lists.remove(0) };

                let input_offset = contiguous_offset(input_var, &input_names, "input", group_index)?;
                let output_offset = contiguous_offset(output_var, &output_names, "output", group_index)?;
                let input_length = group_length(input_var, &input_names);
                let output_length = group_length(output_var, &output_names);

                out.push(DimGroup {
                    input_dim_names: input_names,
                    output_dim_names: output_names,
                    input_length,
                    output_length,
                    input_offset,
                    output_offset,
                    order: group_index,
                });
            }
            out
        }
    };

    check_full_coverage(&groups, input_var, output_var)?;

    let mut groups = groups;
    groups.sort_by_key(|g| g.input_offset);
    Ok(groups)
}
