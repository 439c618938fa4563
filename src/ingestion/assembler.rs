//! Sparse worksheet cells to dense rows.
//!
//! [`RowAssembler`] consumes [`SheetEvent`]s and keeps one owned buffer for the row being read.
//! At each row end the buffer is expanded into a dense row as wide as the widest row seen so
//! far. The first non-empty row becomes the header; every later non-empty row goes to the
//! [`RowSink`]. Rows without cells are skipped.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::mem;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{Headers, RawRow, Value};

use super::decode::{CellType, DateSystem, column_index, decode_cell};
use super::events::{SheetEvent, SheetEventReader};
use super::shared_strings::SharedStrings;
use super::styles::StyleTable;

/// Whether the assembler should keep reading after a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFlow {
    Continue,
    Stop,
}

/// Receives the header and the data rows of one sheet.
pub trait RowSink {
    fn header(&mut self, headers: Headers) -> IngestionResult<()>;

    fn row(&mut self, row: RawRow) -> IngestionResult<RowFlow>;
}

/// Lookup tables needed to decode cell payloads.
#[derive(Debug, Clone, Copy)]
pub struct DecodeTables<'a> {
    pub shared_strings: &'a SharedStrings,
    pub styles: &'a StyleTable,
    pub date_system: DateSystem,
}

#[derive(Debug)]
enum State {
    Idle,
    InRow,
    InCell {
        column: usize,
        cell_type: CellType,
        style: Option<usize>,
        text: String,
    },
}

pub struct RowAssembler<'a> {
    tables: DecodeTables<'a>,
    state: State,
    row_number: usize,
    next_column: usize,
    cells: BTreeMap<usize, Value>,
    max_columns: usize,
    header_seen: bool,
}

impl<'a> RowAssembler<'a> {
    pub fn new(tables: DecodeTables<'a>) -> Self {
        Self {
            tables,
            state: State::Idle,
            row_number: 0,
            next_column: 0,
            cells: BTreeMap::new(),
            max_columns: 0,
            header_seen: false,
        }
    }

    pub fn header_seen(&self) -> bool {
        self.header_seen
    }

    /// Apply one event.
    pub fn handle<S: RowSink>(
        &mut self,
        event: SheetEvent,
        sink: &mut S,
    ) -> IngestionResult<RowFlow> {
        match event {
            SheetEvent::RowStart { number } => {
                if !matches!(self.state, State::Idle) {
                    return Err(IngestionError::invalid_document(format!(
                        "row started inside row {}",
                        self.row_number
                    )));
                }
                self.row_number = number.unwrap_or(self.row_number + 1);
                self.next_column = 0;
                self.cells.clear();
                self.state = State::InRow;
            }
            SheetEvent::CellStart {
                reference,
                cell_type,
                style,
            } => {
                if !matches!(self.state, State::InRow) {
                    return Err(IngestionError::invalid_document(format!(
                        "cell outside of a row near row {}",
                        self.row_number
                    )));
                }
                let column = reference
                    .as_deref()
                    .and_then(column_index)
                    .unwrap_or(self.next_column);
                self.state = State::InCell {
                    column,
                    cell_type,
                    style,
                    text: String::new(),
                };
            }
            SheetEvent::Text(t) => {
                if let State::InCell { text, .. } = &mut self.state {
                    text.push_str(&t);
                }
            }
            SheetEvent::CellEnd => {
                let State::InCell {
                    column,
                    cell_type,
                    style,
                    text,
                } = mem::replace(&mut self.state, State::InRow)
                else {
                    return Err(IngestionError::invalid_document(format!(
                        "unbalanced cell end in row {}",
                        self.row_number
                    )));
                };
                let t = self.tables;
                let value = decode_cell(
                    &text,
                    cell_type,
                    style,
                    t.shared_strings,
                    t.styles,
                    t.date_system,
                );
                self.cells.insert(column, value);
                self.next_column = column + 1;
            }
            SheetEvent::RowEnd => {
                if !matches!(self.state, State::InRow) {
                    return Err(IngestionError::invalid_document(format!(
                        "unbalanced row end at row {}",
                        self.row_number
                    )));
                }
                self.state = State::Idle;
                return self.finish_row(sink);
            }
        }
        Ok(RowFlow::Continue)
    }

    fn finish_row<S: RowSink>(&mut self, sink: &mut S) -> IngestionResult<RowFlow> {
        let Some((&last, _)) = self.cells.last_key_value() else {
            return Ok(RowFlow::Continue);
        };
        self.max_columns = self.max_columns.max(last + 1);

        let mut values = vec![Value::Null; self.max_columns];
        for (col, v) in mem::take(&mut self.cells) {
            values[col] = v;
        }

        if !self.header_seen {
            self.header_seen = true;
            let names: Vec<String> = values.iter().map(Value::to_string).collect();
            sink.header(Headers::new(names)?)?;
            return Ok(RowFlow::Continue);
        }
        sink.row(RawRow::new(self.row_number, values))
    }

    /// Read a whole worksheet part into `sink`.
    ///
    /// Stops early when the sink returns [`RowFlow::Stop`]. Fails when the sheet has no header row.
    pub fn run<R: BufRead, S: RowSink>(
        mut self,
        events: &mut SheetEventReader<R>,
        sink: &mut S,
    ) -> IngestionResult<()> {
        while let Some(event) = events.next_event()? {
            if self.handle(event, sink)? == RowFlow::Stop {
                return Ok(());
            }
        }
        if !self.header_seen {
            return Err(IngestionError::invalid_document("no header row found in sheet"));
        }
        Ok(())
    }
}
