//! Reading and writing hypergraphs, attribute files and solutions.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::hypergraph::Hypergraph;
use crate::util::Matrix;

/// Input files of one partitioning run. Only the hypergraph is required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputFiles {
    pub hypergraph: PathBuf,
    pub fixed: Option<PathBuf>,
    pub community: Option<PathBuf>,
    pub group: Option<PathBuf>,
    pub placement: Option<PathBuf>,
}

impl InputFiles {
    pub fn new(hypergraph: impl Into<PathBuf>) -> Self {
        Self {
            hypergraph: hypergraph.into(),
            ..Self::default()
        }
    }

    pub fn log(&self) {
        let mut files = String::from("Display Used Files");
        let named = [
            ("Fixed file", &self.fixed),
            ("Community file", &self.community),
            ("Group file", &self.group),
            ("Placement file", &self.placement),
        ];
        for (name, path) in named {
            if let Some(path) = path {
                files += &format!("\n\t{name}: {}", path.display());
            }
        }
        files += &format!("\n\tHypergraph file: {}", self.hypergraph.display());
        info!("{files}");
    }
}

/// `<path><ext>`, e.g. `graph.hgr.part.4`
pub fn extend_filename(p: &Path, ext: impl std::fmt::Display) -> PathBuf {
    let mut filename = OsString::from(p.as_os_str());
    filename.push(ext.to_string());
    PathBuf::from(filename)
}

/// where the solution for `k` blocks of `hypergraph_file` is written
pub fn partition_file_name(hypergraph_file: &Path, num_parts: usize) -> PathBuf {
    extend_filename(hypergraph_file, format_args!(".part.{num_parts}"))
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(Error::io(path))
}

/// non-comment lines with their 1-based line numbers
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.starts_with('%'))
}

fn parse_all<T: FromStr>(path: &Path, line: usize, s: &str) -> Result<Vec<T>> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse()
                .map_err(|_| Error::parse(path, line, format!("cannot parse '{t}'")))
        })
        .collect()
}

/// 1-based vertex ids to 0-based ones
fn to_vertex_ids(path: &Path, line: usize, ids: Vec<i64>, num_vertices: usize) -> Result<Vec<usize>> {
    ids.into_iter()
        .map(|id| {
            if id < 1 || id as usize > num_vertices {
                Err(Error::parse(
                    path,
                    line,
                    format!("vertex {id} is outside 1..={num_vertices}"),
                ))
            } else {
                Ok(id as usize - 1)
            }
        })
        .collect()
}

/// Read a hypergraph in hMETIS format.
///
/// The header is `E V [fmt]`. With `fmt % 10 == 1` every hyperedge line starts with
/// `hyperedge_dimensions` weights, with `fmt >= 10` the hyperedges are followed by one line of
/// `vertex_dimensions` weights per vertex. Missing weights are 1.
pub fn read_hypergraph(
    path: &Path,
    vertex_dimensions: usize,
    hyperedge_dimensions: usize,
) -> Result<Hypergraph> {
    let text = read_to_string(path)?;
    let mut lines = content_lines(&text).filter(|(_, l)| !l.is_empty());

    let Some((hline, header)) = lines.next() else {
        return Err(Error::parse(path, 0, "premature end of input file"));
    };
    let header: Vec<usize> = parse_all(path, hline, header)?;
    if header.len() < 2 {
        return Err(Error::parse(
            path,
            hline,
            "the header must give the number of hyperedges and vertices",
        ));
    }
    let (num_hyperedges, num_vertices) = (header[0], header[1]);
    let fmt = header.get(2).copied().unwrap_or(0);
    let hyperedge_weighted = fmt % 10 == 1;
    let vertex_weighted = fmt >= 10;

    let mut hyperedges = Vec::with_capacity(num_hyperedges);
    let mut hyperedge_weights = Vec::with_capacity(num_hyperedges);
    for _ in 0..num_hyperedges {
        let Some((line, s)) = lines.next() else {
            return Err(Error::parse(
                path,
                0,
                format!("expected {num_hyperedges} hyperedges, found {}", hyperedges.len()),
            ));
        };
        let (weights, ids) = if hyperedge_weighted {
            let values: Vec<f32> = parse_all(path, line, s)?;
            if values.len() < hyperedge_dimensions {
                return Err(Error::parse(path, line, "missing hyperedge weights"));
            }
            let ids: Vec<i64> = values[hyperedge_dimensions..]
                .iter()
                .map(|&x| x as i64)
                .collect();
            (values[..hyperedge_dimensions].to_vec(), ids)
        } else {
            (vec![1.0; hyperedge_dimensions], parse_all::<i64>(path, line, s)?)
        };
        hyperedge_weights.push(weights);
        hyperedges.push(to_vertex_ids(path, line, ids, num_vertices)?);
    }

    let mut vertex_weights = Vec::with_capacity(num_vertices);
    for _ in 0..num_vertices {
        if !vertex_weighted {
            vertex_weights.push(vec![1.0; vertex_dimensions]);
            continue;
        }
        let Some((line, s)) = lines.next() else {
            return Err(Error::parse(
                path,
                0,
                format!("expected {num_vertices} vertex weights, found {}", vertex_weights.len()),
            ));
        };
        let mut w: Vec<f32> = parse_all(path, line, s)?;
        if w.len() < vertex_dimensions {
            return Err(Error::parse(path, line, "missing vertex weights"));
        }
        w.truncate(vertex_dimensions);
        vertex_weights.push(w);
    }

    let hgraph = Hypergraph::new(
        vertex_dimensions,
        hyperedge_dimensions,
        hyperedges,
        vertex_weights,
        hyperedge_weights,
    )?;
    info!(
        "Read hypergraph has {} vertices and {} hyperedges.",
        hgraph.num_vertices(),
        hgraph.num_hyperedges()
    );
    Ok(hgraph)
}

/// whitespace-separated integers of a whole file
fn read_ints(path: &Path) -> Result<Vec<i64>> {
    let text = read_to_string(path)?;
    let mut values = Vec::new();
    for (line, s) in content_lines(&text) {
        values.extend(parse_all::<i64>(path, line, s)?);
    }
    Ok(values)
}

/// Block per vertex, `-1` for free vertices. `None` (with a warning) when the length is wrong.
pub fn read_fixed(path: &Path, num_vertices: usize) -> Result<Option<Vec<Option<usize>>>> {
    let values = read_ints(path)?;
    if values.len() != num_vertices {
        warn!(
            "{} has {} entries for {num_vertices} vertices, ignoring the fixed attributes",
            path.display(),
            values.len()
        );
        return Ok(None);
    }
    Ok(Some(
        values
            .into_iter()
            .map(|b| usize::try_from(b).ok())
            .collect(),
    ))
}

/// Community per vertex. `None` (with a warning) when the length is wrong.
pub fn read_community(path: &Path, num_vertices: usize) -> Result<Option<Vec<usize>>> {
    let values = read_ints(path)?;
    if values.len() != num_vertices {
        warn!(
            "{} has {} entries for {num_vertices} vertices, ignoring the community attributes",
            path.display(),
            values.len()
        );
        return Ok(None);
    }
    values
        .into_iter()
        .map(|c| {
            usize::try_from(c)
                .map_err(|_| Error::InvalidInput(format!("negative community id {c}")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Groups of vertices that must share a block, one group per line. Lines with fewer than two
/// vertices are ignored.
pub fn read_groups(path: &Path, num_vertices: usize) -> Result<Vec<Vec<usize>>> {
    let text = read_to_string(path)?;
    let mut groups = Vec::new();
    for (line, s) in content_lines(&text) {
        let ids: Vec<i64> = parse_all(path, line, s)?;
        if ids.len() > 1 {
            groups.push(to_vertex_ids(path, line, ids, num_vertices)?);
        }
    }
    Ok(groups)
}

/// Placement embedding, one line of `dimensions` values per vertex.
///
/// The embedding is assumed normalized: `NaN` entries and entries with magnitude of at least
/// 0.5 count as missing and read as 0. Each dimension is then divided by its mean.
pub fn read_placement(
    path: &Path,
    num_vertices: usize,
    dimensions: usize,
) -> Result<Option<Matrix<f32>>> {
    const INVALID_THR: f32 = 0.5;
    let text = read_to_string(path)?;
    let mut rows: Matrix<f32> = Vec::with_capacity(num_vertices);
    for (line, s) in content_lines(&text) {
        if s.is_empty() {
            continue;
        }
        let mut row: Vec<f32> = parse_all(path, line, s)?;
        for x in &mut row {
            if x.is_nan() || x.abs() >= INVALID_THR {
                *x = 0.0;
            }
        }
        row.resize(dimensions, 0.0);
        rows.push(row);
    }
    if rows.len() != num_vertices {
        warn!(
            "{} has {} entries for {num_vertices} vertices, ignoring the placement",
            path.display(),
            rows.len()
        );
        return Ok(None);
    }

    let mut mean = vec![0.0; dimensions];
    for row in &rows {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x;
        }
    }
    for m in &mut mean {
        *m /= num_vertices.max(1) as f32;
    }
    for row in &mut rows {
        for (x, m) in row.iter_mut().zip(&mean) {
            if *m != 0.0 {
                *x /= m;
            }
        }
    }
    Ok(Some(rows))
}

/// The hypergraph of `files` with its optional attributes, plus the groups.
pub fn read_inputs(
    files: &InputFiles,
    vertex_dimensions: usize,
    hyperedge_dimensions: usize,
    placement_dimensions: usize,
) -> Result<(Hypergraph, Vec<Vec<usize>>)> {
    let mut hgraph = read_hypergraph(&files.hypergraph, vertex_dimensions, hyperedge_dimensions)?;
    let n = hgraph.num_vertices();
    if let Some(path) = &files.fixed {
        if let Some(fixed) = read_fixed(path, n)? {
            hgraph = hgraph.with_fixed(fixed)?;
        }
    }
    if let Some(path) = &files.community {
        if let Some(community) = read_community(path, n)? {
            hgraph = hgraph.with_community(community)?;
        }
    }
    if let Some(path) = files.placement.as_ref().filter(|_| placement_dimensions > 0) {
        if let Some(placement) = read_placement(path, n, placement_dimensions)? {
            hgraph = hgraph.with_placement(placement_dimensions, placement)?;
        }
    }
    let groups = match &files.group {
        Some(path) => read_groups(path, n)?,
        None => Vec::new(),
    };
    Ok((hgraph, groups))
}

/// one block id per line
pub fn write_partition(path: &Path, solution: &[usize]) -> Result<()> {
    let file = File::create(path).map_err(Error::io(path))?;
    let mut out = BufWriter::new(file);
    for b in solution {
        writeln!(out, "{b}").map_err(Error::io(path))?;
    }
    out.flush().map_err(Error::io(path))
}

/// Read a solution written by [`write_partition`].
pub fn read_solution(path: &Path, num_vertices: usize, num_parts: usize) -> Result<Vec<usize>> {
    let values = read_ints(path)?;
    if values.len() != num_vertices {
        return Err(Error::InvalidInput(format!(
            "{} has {} entries for {num_vertices} vertices",
            path.display(),
            values.len()
        )));
    }
    values
        .into_iter()
        .map(|b| match usize::try_from(b) {
            Ok(b) if b < num_parts => Ok(b),
            _ => Err(Error::InvalidInput(format!(
                "block {b} is outside 0..{num_parts}"
            ))),
        })
        .collect()
}

fn write_hypergraph_with<F, G>(
    path: &Path,
    hgraph: &Hypergraph,
    with_weight: bool,
    hyperedge_cost: F,
    vertex_weight: G,
) -> Result<()>
where
    F: Fn(usize) -> String,
    G: Fn(usize) -> String,
{
    let file = File::create(path).map_err(Error::io(path))?;
    let mut out = BufWriter::new(file);
    let mut write = || -> std::io::Result<()> {
        if with_weight {
            writeln!(out, "{}  {} 11", hgraph.num_hyperedges(), hgraph.num_vertices())?;
        } else {
            writeln!(out, "{}  {}", hgraph.num_hyperedges(), hgraph.num_vertices())?;
        }
        for e in 0..hgraph.num_hyperedges() {
            if with_weight {
                write!(out, "{}  ", hyperedge_cost(e))?;
            }
            for &v in hgraph.vertices(e) {
                write!(out, "{} ", v + 1)?;
            }
            writeln!(out)?;
        }
        if with_weight {
            for v in 0..hgraph.num_vertices() {
                writeln!(out, "{}", vertex_weight(v))?;
            }
        }
        out.flush()
    };
    write().map_err(Error::io(path))
}

/// Write `hgraph` in hMETIS format with its scalar hyperedge costs (timing included) and vertex
/// weight norms.
pub fn write_weighted_hypergraph(
    path: &Path,
    hgraph: &Hypergraph,
    evaluator: &Evaluator,
    with_weight: bool,
) -> Result<()> {
    write_hypergraph_with(
        path,
        hgraph,
        with_weight,
        |e| evaluator.hyperedge_cost(hgraph, e).to_string(),
        |v| evaluator.vertex_weight_norm(hgraph, v).to_string(),
    )
}

/// like [`write_weighted_hypergraph`], with every weight rounded to an integer
pub fn write_int_weight_hypergraph(
    path: &Path,
    hgraph: &Hypergraph,
    evaluator: &Evaluator,
) -> Result<()> {
    write_hypergraph_with(
        path,
        hgraph,
        true,
        |e| format!("{}", evaluator.hyperedge_cost(hgraph, e).round()),
        |v| format!("{}", evaluator.vertex_weight_norm(hgraph, v).round()),
    )
}
