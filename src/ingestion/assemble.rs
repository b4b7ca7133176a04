//! Table assembly: tokenize records, fit them to the header, infer and coerce each column.
//!
//! The sequential path streams the input through one [`Tokenizer`]. The parallel path holds the
//! whole text, cuts it at record boundaries with [`find_split_points`] and parses the chunks on a
//! rayon pool. Each chunk gathers per-column [`ColumnEvidence`] and coerces its values with a
//! chunk-local type; the merged evidence then fixes the column type, and only chunks whose local
//! type differs are coerced again. Both paths therefore produce identical tables.

use std::io::BufRead;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, trace, warn};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{Table, TypedColumn, Value};

use super::header::{reconcile, resolve_columns, FieldCountPolicy, ResolvedHeader};
use super::infer::{Candidate, ColumnEvidence, ColumnPlan, WideningPolicy};
use super::read::{MalformedRowPolicy, ParallelOptions, ReadOptions};
use super::tokenizer::{find_split_points, RawRecord, Tokenizer};

/// Rows parsed between two cancellation checks inside a chunk.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// A finished read: the table plus bookkeeping reported to observers.
#[derive(Debug)]
pub(crate) struct Assembled {
    pub table: Table,
    pub skipped_rows: usize,
    pub chunks: usize,
}

/// Column plans and policies shared by every chunk of one read.
struct ReadPlan<'a> {
    options: &'a ReadOptions,
    columns: Vec<ColumnPlan>,
    policy: FieldCountPolicy,
}

impl<'a> ReadPlan<'a> {
    fn new(options: &'a ReadOptions, header: &ResolvedHeader) -> Self {
        let columns = header
            .columns
            .iter()
            .map(|spec| {
                let parser = spec
                    .parser
                    .clone()
                    .unwrap_or_else(|| options.parser_options.clone());
                ColumnPlan::new(&spec.name, spec.type_override, parser, &options.inference)
            })
            .collect();
        Self {
            options,
            columns,
            policy: FieldCountPolicy {
                allow_missing_columns: options.allow_missing_columns,
                ignore_excess_columns: options.ignore_excess_columns,
            },
        }
    }

    fn width(&self) -> usize {
        self.columns.len()
    }

    fn check_cancelled(&self) -> IngestionResult<()> {
        match &self.options.cancellation {
            Some(token) if token.is_cancelled() => Err(IngestionError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Swallow a malformed record under [`MalformedRowPolicy::Skip`]; anything else propagates.
    fn handle_malformed(&self, error: IngestionError, skipped: &mut usize) -> IngestionResult<()> {
        match error {
            IngestionError::MalformedRecord { line, message, .. }
                if self.options.on_malformed == MalformedRowPolicy::Skip =>
            {
                warn!(line, %message, "skipping malformed record");
                *skipped += 1;
                Ok(())
            }
            other => Err(other),
        }
    }
}

/// One column of one chunk.
struct ChunkColumn {
    raw: Vec<Option<String>>,
    evidence: ColumnEvidence,
    /// Chunk-local type and the values coerced to it. `None` for overridden columns, which are
    /// only coerced once the whole column has been seen.
    local: Option<(Candidate, Vec<Value>)>,
}

struct ChunkOutcome {
    lines: Vec<usize>,
    columns: Vec<ChunkColumn>,
    skipped: usize,
}

/// Parse records into column evidence and chunk-local values.
///
/// With `limit`, stops pulling records once that many rows have been kept. Skipped records do
/// not count.
fn parse_chunk<I>(
    index: usize,
    records: I,
    limit: Option<usize>,
    plan: &ReadPlan<'_>,
) -> IngestionResult<ChunkOutcome>
where
    I: Iterator<Item = IngestionResult<RawRecord>>,
{
    plan.check_cancelled()?;
    let width = plan.width();
    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    let mut evidence: Vec<ColumnEvidence> = plan.columns.iter().map(ColumnPlan::empty_evidence).collect();
    let mut lines = Vec::new();
    let mut skipped = 0usize;

    let mut records = records.enumerate();
    while limit.is_none_or(|max| lines.len() < max) {
        let Some((n, record)) = records.next() else {
            break;
        };
        if n > 0 && n % CANCEL_CHECK_INTERVAL == 0 {
            plan.check_cancelled()?;
        }
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                plan.handle_malformed(e, &mut skipped)?;
                continue;
            }
        };
        let line = record.line;
        let row = match reconcile(record, width, plan.policy, &plan.options.dialect) {
            Ok(row) => row,
            Err(e) => {
                plan.handle_malformed(e, &mut skipped)?;
                continue;
            }
        };
        for ((value, column), (ev, col_plan)) in row
            .into_iter()
            .zip(raw.iter_mut())
            .zip(evidence.iter_mut().zip(&plan.columns))
        {
            ev.observe(col_plan, value.as_deref());
            column.push(value);
        }
        lines.push(line);
    }
    trace!(chunk = index, rows = lines.len(), skipped, "chunk tokenized");

    let mut columns = Vec::with_capacity(width);
    for ((raw, evidence), col_plan) in raw.into_iter().zip(evidence).zip(&plan.columns) {
        let local = if col_plan.type_override.is_none() {
            let candidate = col_plan.resolve(&evidence, &evidence, WideningPolicy::Widen);
            let values = col_plan.coerce(&candidate, &raw, &lines)?;
            Some((candidate, values))
        } else {
            None
        };
        columns.push(ChunkColumn {
            raw,
            evidence,
            local,
        });
    }

    Ok(ChunkOutcome {
        lines,
        columns,
        skipped,
    })
}

/// Evidence over the first `n` rows of the column, across chunks in order.
fn sample_evidence(plan: &ColumnPlan, parts: &[ChunkColumn], n: usize) -> ColumnEvidence {
    let mut evidence = plan.empty_evidence();
    for raw in parts.iter().flat_map(|p| p.raw.iter()).take(n) {
        evidence.observe(plan, raw.as_deref());
    }
    evidence
}

fn finalize_column(
    plan: &ColumnPlan,
    parts: Vec<ChunkColumn>,
    lines: &[Vec<usize>],
    options: &ReadOptions,
) -> IngestionResult<TypedColumn> {
    let mut full = plan.empty_evidence();
    for part in &parts {
        full.merge(&part.evidence);
    }
    let sample = match options.inference.sample_rows {
        Some(n) if plan.type_override.is_none() => sample_evidence(plan, &parts, n),
        _ => full.clone(),
    };
    let target = plan.resolve(&sample, &full, options.inference.widening);

    let total: usize = parts.iter().map(|p| p.raw.len()).sum();
    let mut values = Vec::with_capacity(total);
    for (i, part) in parts.into_iter().enumerate() {
        match part.local {
            Some((local, local_values)) if local == target => values.extend(local_values),
            local => {
                if let Some((local, _)) = &local {
                    debug!(
                        column = %plan.name,
                        chunk = i,
                        from = %local.ty,
                        to = %target.ty,
                        "re-coercing chunk to the merged column type"
                    );
                }
                values.extend(plan.coerce(&target, &part.raw, &lines[i])?);
            }
        }
    }
    Ok(TypedColumn::new(plan.name.clone(), target.ty, values))
}

/// Merge chunk outcomes (in input order) into the final table.
fn finalize(plan: &ReadPlan<'_>, chunks: Vec<ChunkOutcome>) -> IngestionResult<Assembled> {
    let chunk_count = chunks.len();
    let skipped_rows = chunks.iter().map(|c| c.skipped).sum();

    let mut lines = Vec::with_capacity(chunk_count);
    let mut per_column: Vec<Vec<ChunkColumn>> =
        (0..plan.width()).map(|_| Vec::with_capacity(chunk_count)).collect();
    for chunk in chunks {
        lines.push(chunk.lines);
        for (parts, column) in per_column.iter_mut().zip(chunk.columns) {
            parts.push(column);
        }
    }

    let columns: Vec<IngestionResult<TypedColumn>> = per_column
        .into_par_iter()
        .zip(plan.columns.par_iter())
        .map(|(parts, col_plan)| finalize_column(col_plan, parts, &lines, plan.options))
        .collect();
    let columns = columns.into_iter().collect::<IngestionResult<Vec<_>>>()?;

    Ok(Assembled {
        table: Table::new(columns),
        skipped_rows,
        chunks: chunk_count,
    })
}

/// Read `reader` as a single chunk.
pub(crate) fn read_sequential<R: BufRead>(reader: R, options: &ReadOptions) -> IngestionResult<Assembled> {
    let start = Instant::now();
    let mut tokenizer = Tokenizer::new(reader, &options.dialect).with_skip_lines(options.skip_lines);
    let first = tokenizer.next_record()?;
    let header = resolve_columns(&options.header, first.as_ref(), options)?;
    debug!(columns = header.width(), "header resolved");

    let pending = if header.header_consumed { None } else { first };

    let plan = ReadPlan::new(options, &header);
    let records = pending.into_iter().map(Ok).chain(tokenizer);
    let chunk = parse_chunk(0, records, options.read_lines, &plan)?;
    let assembled = finalize(&plan, vec![chunk])?;
    debug!(
        rows = assembled.table.row_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sequential read finished"
    );
    Ok(assembled)
}

/// Byte offset and count of the first `n` physical lines of `text`.
fn skip_physical_lines(text: &str, n: usize) -> (usize, usize) {
    text.split_inclusive('\n')
        .take(n)
        .fold((0, 0), |(offset, lines), l| (offset + l.len(), lines + 1))
}

fn chunk_count(len: usize, parallel: &ParallelOptions) -> usize {
    let threads = parallel.num_threads.unwrap_or_else(rayon::current_num_threads);
    let wanted = parallel.target_chunks.unwrap_or(threads).max(1);
    let by_size = (len / parallel.min_chunk_bytes.max(1)).max(1);
    wanted.min(by_size)
}

/// Read `text` in chunks on a rayon pool.
pub(crate) fn read_parallel(text: &str, options: &ReadOptions) -> IngestionResult<Assembled> {
    let start = Instant::now();
    let (skip_offset, skipped_lines) = skip_physical_lines(text, options.skip_lines);
    let rest = &text[skip_offset..];

    let mut header_tokenizer = Tokenizer::new(rest.as_bytes(), &options.dialect).with_first_line(skipped_lines + 1);
    let first = header_tokenizer.next_record()?;
    let header = resolve_columns(&options.header, first.as_ref(), options)?;
    let dialect = header_tokenizer.dialect().clone();
    let (body_offset, body_line) = if header.header_consumed {
        (skip_offset + header_tokenizer.byte_offset(), header_tokenizer.line() + 1)
    } else {
        (skip_offset, skipped_lines + 1)
    };
    let body = &text[body_offset..];

    // Boundaries still unresolved means no record line yet; one chunk resolves them itself.
    let parts = if dialect.has_boundaries_resolved() {
        chunk_count(body.len(), &options.parallel)
    } else {
        1
    };
    let splits = find_split_points(body, &dialect, body_line, parts);
    let mut ranges = Vec::with_capacity(splits.len() + 1);
    let mut chunk_start = (0usize, body_line);
    for split in &splits {
        ranges.push((chunk_start.0, split.offset, chunk_start.1));
        chunk_start = (split.offset, split.line);
    }
    ranges.push((chunk_start.0, body.len(), chunk_start.1));
    debug!(
        columns = header.width(),
        chunks = ranges.len(),
        bytes = body.len(),
        "parsing in parallel"
    );

    let plan = ReadPlan::new(options, &header);
    let run = || -> IngestionResult<Assembled> {
        let outcomes: Vec<IngestionResult<ChunkOutcome>> = ranges
            .par_iter()
            .enumerate()
            .map(|(i, &(from, to, line))| {
                let tokenizer = Tokenizer::new(body[from..to].as_bytes(), &dialect).with_first_line(line);
                parse_chunk(i, tokenizer, None, &plan)
            })
            .collect();
        // First failure in input order wins.
        let chunks = outcomes.into_iter().collect::<IngestionResult<Vec<_>>>()?;
        finalize(&plan, chunks)
    };

    let assembled = match options.parallel.num_threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| IngestionError::configuration(format!("failed to build thread pool: {e}")))?
            .install(run),
        None => run(),
    }?;
    debug!(
        rows = assembled.table.row_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "parallel read finished"
    );
    Ok(assembled)
}
