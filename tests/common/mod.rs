#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use zip::write::FileOptions;
use zip::ZipWriter;

pub fn tmp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("sheet-records-{name}-{nanos}.xlsx"))
}

/// A cell for hand-written worksheet XML.
#[derive(Debug, Clone)]
pub enum Cell {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Index into the shared string table.
    Shared(usize),
    /// Number with a style index.
    Styled(f64, usize),
    Error(&'static str),
}

pub fn s(v: &str) -> Option<Cell> {
    Some(Cell::Str(v.to_string()))
}

pub fn n(v: f64) -> Option<Cell> {
    Some(Cell::Num(v))
}

pub fn column_letters(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `<row>` element for physical row `number`. `None` cells are left out entirely.
pub fn row_xml(number: usize, cells: &[Option<Cell>]) -> String {
    let mut out = format!("<row r=\"{number}\">");
    for (i, cell) in cells.iter().enumerate() {
        let Some(cell) = cell else { continue };
        let r = format!("{}{number}", column_letters(i));
        let c = match cell {
            Cell::Str(v) => {
                format!("<c r=\"{r}\" t=\"inlineStr\"><is><t>{}</t></is></c>", escape(v))
            }
            Cell::Num(v) => format!("<c r=\"{r}\"><v>{v}</v></c>"),
            Cell::Bool(v) => format!("<c r=\"{r}\" t=\"b\"><v>{}</v></c>", u8::from(*v)),
            Cell::Shared(i) => format!("<c r=\"{r}\" t=\"s\"><v>{i}</v></c>"),
            Cell::Styled(v, s) => format!("<c r=\"{r}\" s=\"{s}\"><v>{v}</v></c>"),
            Cell::Error(code) => format!("<c r=\"{r}\" t=\"e\"><v>{code}</v></c>"),
        };
        out.push_str(&c);
    }
    out.push_str("</row>");
    out
}

/// Header row (row 1) followed by data rows numbered from 2.
pub fn table_xml(headers: &[&str], rows: &[Vec<Option<Cell>>]) -> String {
    let header: Vec<Option<Cell>> = headers.iter().map(|h| s(h)).collect();
    let mut out = row_xml(1, &header);
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&row_xml(i + 2, row));
    }
    out
}

/// Builds a minimal workbook package from hand-written parts.
#[derive(Debug, Default)]
pub struct RawWorkbook {
    sheets: Vec<(String, String)>,
    shared: Vec<String>,
    styles: Option<String>,
    date1904: bool,
}

impl RawWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet whose `<sheetData>` holds `rows_xml`.
    pub fn sheet(mut self, name: &str, rows_xml: &str) -> Self {
        self.sheets.push((name.to_string(), rows_xml.to_string()));
        self
    }

    pub fn shared_strings(mut self, strings: &[&str]) -> Self {
        self.shared = strings.iter().map(|s| s.to_string()).collect();
        self
    }

    /// `cellXfs` entries by number format id, plus custom `(id, code)` formats.
    pub fn styles(mut self, xf_formats: &[u32], custom: &[(u32, &str)]) -> Self {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
        );
        if !custom.is_empty() {
            xml.push_str(&format!("<numFmts count=\"{}\">", custom.len()));
            for (id, code) in custom {
                xml.push_str(&format!(
                    "<numFmt numFmtId=\"{id}\" formatCode=\"{}\"/>",
                    escape(code).replace('"', "&quot;")
                ));
            }
            xml.push_str("</numFmts>");
        }
        xml.push_str(&format!("<cellXfs count=\"{}\">", xf_formats.len()));
        for id in xf_formats {
            xml.push_str(&format!(
                "<xf numFmtId=\"{id}\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/>"
            ));
        }
        xml.push_str("</cellXfs></styleSheet>");
        self.styles = Some(xml);
        self
    }

    pub fn date1904(mut self) -> Self {
        self.date1904 = true;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = FileOptions::default();

        let mut workbook = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
             xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
        );
        if self.date1904 {
            workbook.push_str("<workbookPr date1904=\"1\"/>");
        }
        workbook.push_str("<sheets>");
        let mut rels = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
        );
        for (i, (name, _)) in self.sheets.iter().enumerate() {
            workbook.push_str(&format!(
                "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
                escape(name),
                i + 1,
                i + 1
            ));
            rels.push_str(&format!(
                "<Relationship Id=\"rId{}\" \
                 Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" \
                 Target=\"worksheets/sheet{}.xml\"/>",
                i + 1,
                i + 1
            ));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str("</Relationships>");

        zip.start_file("xl/workbook.xml", opts).unwrap();
        zip.write_all(workbook.as_bytes()).unwrap();
        zip.start_file("xl/_rels/workbook.xml.rels", opts).unwrap();
        zip.write_all(rels.as_bytes()).unwrap();

        for (i, (_, rows)) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)
                .unwrap();
            write!(
                zip,
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
                 <sheetData>{rows}</sheetData></worksheet>"
            )
            .unwrap();
        }

        if !self.shared.is_empty() {
            zip.start_file("xl/sharedStrings.xml", opts).unwrap();
            write!(
                zip,
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
                 count=\"{0}\" uniqueCount=\"{0}\">",
                self.shared.len()
            )
            .unwrap();
            for s in &self.shared {
                write!(zip, "<si><t>{}</t></si>", escape(s)).unwrap();
            }
            zip.write_all(b"</sst>").unwrap();
        }

        if let Some(styles) = &self.styles {
            zip.start_file("xl/styles.xml", opts).unwrap();
            zip.write_all(styles.as_bytes()).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    pub fn save(&self, path: &Path) {
        std::fs::write(path, self.to_bytes()).unwrap();
    }
}

/// One sheet of `rows` data rows: `ID` (1..=rows) and `Name` (`name-<id>`).
pub fn numbered_sheet(rows: usize) -> Vec<u8> {
    let mut xml = String::with_capacity(rows * 80);
    xml.push_str(&row_xml(1, &[s("ID"), s("Name")]));
    for id in 1..=rows {
        xml.push_str(&row_xml(id + 1, &[n(id as f64), s(&format!("name-{id}"))]));
    }
    RawWorkbook::new().sheet("Data", &xml).to_bytes()
}

/// A realistic workbook written by `rust_xlsxwriter`: `People` and `Teams` sheets.
pub fn write_people_xlsx(path: &Path) {
    use rust_xlsxwriter::{Format, Workbook};

    let mut wb = Workbook::new();
    let date = Format::new().set_num_format("yyyy-mm-dd");

    let people = wb.add_worksheet();
    people.set_name("People").unwrap();
    people.write_string(0, 0, "ID").unwrap();
    people.write_string(0, 1, "Name").unwrap();
    people.write_string(0, 2, "Score").unwrap();
    people.write_string(0, 3, "Active").unwrap();
    people.write_string(0, 4, "Joined").unwrap();

    people.write_number(1, 0, 1).unwrap();
    people.write_string(1, 1, "Ada").unwrap();
    people.write_number(1, 2, 98.5).unwrap();
    people.write_boolean(1, 3, true).unwrap();
    // 2024-01-15
    people.write_number_with_format(1, 4, 45306, &date).unwrap();

    people.write_number(2, 0, 2).unwrap();
    people.write_string(2, 1, "Grace").unwrap();
    people.write_number(2, 2, 87.25).unwrap();
    people.write_boolean(2, 3, false).unwrap();
    // 1999-12-31
    people.write_number_with_format(2, 4, 36525, &date).unwrap();

    let teams = wb.add_worksheet();
    teams.set_name("Teams").unwrap();
    teams.write_string(0, 0, "ID").unwrap();
    teams.write_string(0, 1, "Name").unwrap();
    teams.write_number(1, 0, 10).unwrap();
    teams.write_string(1, 1, "Compilers").unwrap();

    wb.save(path).unwrap();
}
