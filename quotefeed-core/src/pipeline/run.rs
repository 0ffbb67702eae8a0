//! Run orchestrator: resolves each symbol through the fallback chain and
//! writes its export lines.
//!
//! Symbols are processed strictly one after another, in sorted order. For
//! each symbol the resolvers are asked in priority order; the first one that
//! finds the symbol supplies every row for it and no later resolver is
//! consulted. Any error ends the run before another line is written.

use super::resolver::{Resolution, Resolver};
use crate::data::provider::{DataError, FetchProgress, ProviderId, VolumeScale};
use crate::domain::{CanonicalRow, DateRange, SymbolList};
use crate::export::ExportFormat;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, info};

/// Rows resolved for one symbol, with the provider that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub provider: ProviderId,
    pub scale: VolumeScale,
    pub rows: Vec<CanonicalRow>,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub symbols: usize,
    pub lines: usize,
    /// Symbols answered per provider.
    pub by_provider: BTreeMap<ProviderId, usize>,
}

/// An ordered fallback chain plus the export format for its lines.
pub struct Pipeline {
    resolvers: Vec<Box<dyn Resolver>>,
    format: ExportFormat,
    range: DateRange,
}

impl Pipeline {
    pub fn new(range: DateRange, format: ExportFormat) -> Self {
        Self {
            resolvers: Vec::new(),
            format,
            range,
        }
    }

    /// Append a resolver; earlier resolvers take priority.
    pub fn with_resolver(mut self, resolver: Box<dyn Resolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.resolvers.iter().map(|r| r.provider()).collect()
    }

    /// Walk the chain for one symbol.
    pub fn resolve_symbol(
        &self,
        symbol: &str,
        progress: &dyn FetchProgress,
    ) -> Result<Resolved, DataError> {
        if self.resolvers.is_empty() {
            return Err(DataError::Config("pipeline has no resolvers".into()));
        }

        for resolver in &self.resolvers {
            match resolver.resolve(symbol, &self.range, progress)? {
                Resolution::Found {
                    provider,
                    scale,
                    rows,
                } => return Ok(Resolved {
                    provider,
                    scale,
                    rows,
                }),
                Resolution::NotFound => {
                    debug!(provider = %resolver.provider(), symbol, "not found, falling through");
                }
            }
        }

        Err(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })
    }

    /// Resolve every symbol and write its lines to `out`.
    ///
    /// A symbol's lines are written together once all of its rows are in
    /// hand, so a failure never leaves a partial symbol in the output.
    pub fn run<W: Write>(
        &self,
        symbols: &SymbolList,
        out: &mut W,
        progress: &dyn FetchProgress,
    ) -> Result<RunSummary, DataError> {
        let total = symbols.len();
        let mut summary = RunSummary::default();
        info!(
            symbols = total,
            from = %self.range.from(),
            to = %self.range.to(),
            "starting run"
        );

        for (index, symbol) in symbols.iter().enumerate() {
            progress.on_start(symbol, index, total);
            let resolved = self.resolve_symbol(symbol, progress)?;

            let mut block = String::new();
            for row in &resolved.rows {
                block.push_str(&self.format.line(row, resolved.scale));
                block.push('\n');
            }
            out.write_all(block.as_bytes())?;

            summary.symbols += 1;
            summary.lines += resolved.rows.len();
            *summary.by_provider.entry(resolved.provider).or_default() += 1;
            progress.on_complete(symbol, resolved.provider, resolved.rows.len());
        }

        out.flush()?;
        info!(symbols = summary.symbols, lines = summary.lines, "run complete");
        Ok(summary)
    }
}
