// ==========================================
// 学费缴款对账系统 - 分块读取器
// ==========================================
// 职责: 先暴露表头，再按固定行数分块产出数据行
// 支持: 分隔文本 (.csv/.txt/.tsv) / 工作簿 (.xlsx/.xlsm/.xls/.ods)
// 红线: 分隔文本逐行流式读取，内存不随文件大小增长；
//       工作簿由底层库整表载入，但每次只切出 chunk_size 行交给调用方
// ==========================================

use crate::importer::error::{ImportError, ImporterResult};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDateTime;
use csv::{ByteRecord, ReaderBuilder};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// 分隔文本扩展名
pub const DELIMITED_EXTENSIONS: &[&str] = &["csv", "txt", "tsv"];
/// 工作簿扩展名
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// 越界/未映射列的占位值
pub static EMPTY_CELL: CellValue = CellValue::Empty;

// ==========================================
// CellValue - 单元格值
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// 文本单元格构造（TRIM，空串视为 Empty）
    pub fn text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// 显示文本（整数值的浮点数不带 `.0`）
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

// ==========================================
// RawRow - 原始数据行
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 数据行号（表头之后从 1 开始；空白行跳过但占号）
    pub row_number: usize,
    pub cells: Vec<CellValue>,
}

impl RawRow {
    /// 越界列返回 Empty
    pub fn cell(&self, column: usize) -> &CellValue {
        self.cells.get(column).unwrap_or(&EMPTY_CELL)
    }

    fn is_blank(cells: &[CellValue]) -> bool {
        cells.iter().all(CellValue::is_empty)
    }
}

// ==========================================
// ChunkReader Trait
// ==========================================
pub trait ChunkReader: Send {
    /// 表头行（原始文本，已 TRIM）
    fn header(&self) -> &[String];

    /// 读取下一块
    ///
    /// # 返回
    /// - Ok(Some(rows)): 最多 chunk_size 行（末块可能更少，甚至为空）
    /// - Ok(None): 已读完
    fn next_chunk(&mut self) -> ImporterResult<Option<Vec<RawRow>>>;
}

/// 取小写扩展名
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// 按扩展名打开分块读取器
pub fn open_chunk_reader(path: &Path, chunk_size: usize) -> ImporterResult<Box<dyn ChunkReader>> {
    let ext = file_extension(path);
    if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(Box::new(CsvChunkReader::open(path, chunk_size)?))
    } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        Ok(Box::new(WorkbookChunkReader::open(path, chunk_size)?))
    } else {
        Err(ImportError::UnsupportedFormat(ext))
    }
}

// ==========================================
// CSV 分块读取器
// ==========================================
pub struct CsvChunkReader {
    reader: csv::Reader<BlankLineMarker<File>>,
    header: Vec<String>,
    chunk_size: usize,
    record: ByteRecord,
    next_row_number: usize,
    exhausted: bool,
}

impl CsvChunkReader {
    pub fn open(path: &Path, chunk_size: usize) -> ImporterResult<Self> {
        let delimiter = sniff_delimiter(path)?;

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .delimiter(delimiter)
            .from_reader(BlankLineMarker::new(file, delimiter));

        // 读取表头（跳过文件开头的空白行）
        let mut record = ByteRecord::new();
        let header = loop {
            if !reader.read_byte_record(&mut record)? {
                return Err(ImportError::EmptyFile);
            }
            let cells: Vec<String> = record
                .iter()
                .map(|field| String::from_utf8_lossy(field).trim().to_string())
                .collect();
            if cells.iter().any(|c| !c.is_empty()) {
                break cells;
            }
        };

        let mut header = header;
        if let Some(first) = header.first_mut() {
            *first = first.trim_start_matches('\u{feff}').trim().to_string();
        }

        Ok(Self {
            reader,
            header,
            chunk_size: chunk_size.max(1),
            record,
            next_row_number: 1,
            exhausted: false,
        })
    }
}

impl ChunkReader for CsvChunkReader {
    fn header(&self) -> &[String] {
        &self.header
    }

    fn next_chunk(&mut self) -> ImporterResult<Option<Vec<RawRow>>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(self.chunk_size);
        while rows.len() < self.chunk_size {
            if !self.reader.read_byte_record(&mut self.record)? {
                self.exhausted = true;
                break;
            }

            let row_number = self.next_row_number;
            self.next_row_number += 1;

            let cells: Vec<CellValue> = self
                .record
                .iter()
                .map(|field| CellValue::text(&String::from_utf8_lossy(field)))
                .collect();

            // 跳过完全空白的行
            if RawRow::is_blank(&cells) {
                continue;
            }

            rows.push(RawRow { row_number, cells });
        }

        if rows.is_empty() && self.exhausted {
            return Ok(None);
        }
        Ok(Some(rows))
    }
}

// ==========================================
// BlankLineMarker - 空行标记
// ==========================================
// csv 库会直接吞掉完全空的物理行，导致其后的行号前移。
// 引号外的空行在送入 csv 库前补一个分隔符，使其作为空白记录返回（跳过但占号）。
struct BlankLineMarker<R> {
    inner: R,
    delimiter: u8,
    pending: Vec<u8>,
    offset: usize,
    at_line_start: bool,
    in_quotes: bool,
}

impl<R: Read> BlankLineMarker<R> {
    fn new(inner: R, delimiter: u8) -> Self {
        Self {
            inner,
            delimiter,
            pending: Vec::new(),
            offset: 0,
            at_line_start: true,
            in_quotes: false,
        }
    }

    fn refill(&mut self) -> io::Result<bool> {
        let mut raw = [0u8; 8 * 1024];
        let n = self.inner.read(&mut raw)?;
        self.pending.clear();
        self.offset = 0;

        for &b in &raw[..n] {
            if self.at_line_start && !self.in_quotes && (b == b'\n' || b == b'\r') {
                self.pending.push(self.delimiter);
            }
            if b == b'"' {
                self.in_quotes = !self.in_quotes;
            }
            // CRLF 的 \n 紧跟 \r，不再视为新的空行
            self.at_line_start = b == b'\n';
            self.pending.push(b);
        }
        Ok(n > 0)
    }
}

impl<R: Read> Read for BlankLineMarker<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() && !self.refill()? {
            return Ok(0);
        }
        let n = (self.pending.len() - self.offset).min(out.len());
        out[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// 从首个非空行嗅探分隔符（`,` `;` TAB，取出现次数最多者，默认 `,`）
fn sniff_delimiter(path: &Path) -> ImporterResult<u8> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(b',');
        }
        if line.iter().any(|b| !b.is_ascii_whitespace()) {
            break;
        }
    }

    let mut in_quotes = false;
    let mut counts = [0usize; 3];
    for &b in &line {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => counts[0] += 1,
            b';' if !in_quotes => counts[1] += 1,
            b'\t' if !in_quotes => counts[2] += 1,
            _ => {}
        }
    }

    let candidates = [b',', b';', b'\t'];
    let best = counts
        .iter()
        .enumerate()
        .max_by_key(|(idx, count)| (**count, std::cmp::Reverse(*idx)))
        .map(|(idx, _)| candidates[idx])
        .unwrap_or(b',');
    Ok(best)
}

// ==========================================
// 工作簿分块读取器
// ==========================================
pub struct WorkbookChunkReader {
    range: Range<Data>,
    header: Vec<String>,
    chunk_size: usize,
    data_start: usize,
    cursor: usize,
}

impl WorkbookChunkReader {
    pub fn open(path: &Path, chunk_size: usize) -> ImporterResult<Self> {
        let mut workbook = open_workbook_auto(path)?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("工作簿无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        // 表头 = 第一个非空行
        let mut cursor = 0;
        let header = loop {
            let row = range.rows().nth(cursor).ok_or(ImportError::EmptyFile)?;
            cursor += 1;
            let cells: Vec<String> = row.iter().map(|c| convert_cell(c).as_text()).collect();
            if cells.iter().any(|c| !c.is_empty()) {
                break cells;
            }
        };

        Ok(Self {
            range,
            header,
            chunk_size: chunk_size.max(1),
            data_start: cursor,
            cursor,
        })
    }
}

impl ChunkReader for WorkbookChunkReader {
    fn header(&self) -> &[String] {
        &self.header
    }

    fn next_chunk(&mut self) -> ImporterResult<Option<Vec<RawRow>>> {
        let height = self.range.height();
        if self.cursor >= height {
            return Ok(None);
        }

        let end = (self.cursor + self.chunk_size).min(height);
        let mut rows = Vec::with_capacity(end - self.cursor);

        for (offset, row) in self
            .range
            .rows()
            .skip(self.cursor)
            .take(end - self.cursor)
            .enumerate()
        {
            let cells: Vec<CellValue> = row.iter().map(convert_cell).collect();
            if RawRow::is_blank(&cells) {
                continue;
            }
            rows.push(RawRow {
                row_number: self.cursor + offset - self.data_start + 1,
                cells,
            });
        }

        self.cursor = end;
        Ok(Some(rows))
    }
}

/// calamine 单元格 → CellValue
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::text(s),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => crate::importer::value_parser::excel_serial_to_datetime(dt.as_f64())
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Empty),
        Data::DateTimeIso(s) => CellValue::text(s),
        _ => CellValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::Builder;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn write_temp(suffix: &str, content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn drain(reader: &mut dyn ChunkReader) -> Vec<Vec<RawRow>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_csv_chunks_honor_chunk_size() {
        let file = write_temp(".csv", b"A,B\n1,x\n2,y\n3,z\n4,w\n5,v\n");
        let mut reader = open_chunk_reader(file.path(), 2).unwrap();
        assert_eq!(reader.header(), &["A".to_string(), "B".to_string()]);

        let chunks = drain(reader.as_mut());
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[2][0].row_number, 5);
        assert_eq!(chunks[2][0].cell(1), &CellValue::Text("v".to_string()));
    }

    #[test]
    fn test_csv_blank_rows_skipped_but_numbered() {
        let file = write_temp(".csv", b"A,B\n1,x\n,\n3,z\n");
        let mut reader = open_chunk_reader(file.path(), 10).unwrap();
        let rows: Vec<RawRow> = drain(reader.as_mut()).into_iter().flatten().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 1);
        assert_eq!(rows[1].row_number, 3);
    }

    #[test]
    fn test_csv_empty_lines_keep_numbering() {
        let file = write_temp(".csv", b"\nA,B\n1,x\n\n3,z\n\r\n\n6,u\n");
        let mut reader = open_chunk_reader(file.path(), 2).unwrap();
        assert_eq!(reader.header(), &["A".to_string(), "B".to_string()]);

        let numbers: Vec<usize> = drain(reader.as_mut())
            .into_iter()
            .flatten()
            .map(|row| row.row_number)
            .collect();
        assert_eq!(numbers, vec![1, 3, 6]);
    }

    #[test]
    fn test_csv_blank_lines_inside_quotes_untouched() {
        let file = write_temp(".csv", b"A,B\n\"baris 1\n\nbaris 3\",x\n\n5,z\n");
        let mut reader = open_chunk_reader(file.path(), 10).unwrap();
        let rows: Vec<RawRow> = drain(reader.as_mut()).into_iter().flatten().collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 1);
        assert_eq!(rows[0].cell(0).as_text(), "baris 1\n\nbaris 3");
        assert_eq!(rows[1].row_number, 3);
        assert_eq!(rows[1].cell(1).as_text(), "z");
    }

    #[test]
    fn test_csv_semicolon_and_bom() {
        let file = write_temp(".csv", "\u{feff}SEKOLAH;NAMA_SISWA\nSMA1;\"Budi; Jr\"\n".as_bytes());
        let mut reader = open_chunk_reader(file.path(), 10).unwrap();
        assert_eq!(reader.header()[0], "SEKOLAH");
        let rows: Vec<RawRow> = drain(reader.as_mut()).into_iter().flatten().collect();
        assert_eq!(rows[0].cell(1).as_text(), "Budi; Jr");
    }

    #[test]
    fn test_csv_short_row_reads_empty_cells() {
        let file = write_temp(".csv", b"A,B,C\n1\n");
        let mut reader = open_chunk_reader(file.path(), 10).unwrap();
        let rows: Vec<RawRow> = drain(reader.as_mut()).into_iter().flatten().collect();
        assert_eq!(rows[0].cell(2), &CellValue::Empty);
        assert_eq!(rows[0].cell(99), &CellValue::Empty);
    }

    #[test]
    fn test_csv_invalid_utf8_is_lossy() {
        let file = write_temp(".csv", b"A\nab\xffc\n");
        let mut reader = open_chunk_reader(file.path(), 10).unwrap();
        let rows: Vec<RawRow> = drain(reader.as_mut()).into_iter().flatten().collect();
        assert!(rows[0].cell(0).as_text().starts_with("ab"));
    }

    #[test]
    fn test_workbook_chunks_rows_and_dates() {
        let mut reader = open_chunk_reader(&fixture("legacy_payments.xlsx"), 2).unwrap();
        assert_eq!(reader.header().len(), 20);
        assert_eq!(reader.header()[0], "SEKOLAH");
        assert_eq!(reader.header()[19], "NO_BUKTI");

        // 第 2 行为空行: 首块只剩 1 行
        let chunks = drain(reader.as_mut());
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 2]);

        let rows: Vec<RawRow> = chunks.into_iter().flatten().collect();
        let numbers: Vec<usize> = rows.iter().map(|r| r.row_number).collect();
        assert_eq!(numbers, vec![1, 3, 4]);

        let date = |month: u32, hour: u32| {
            NaiveDate::from_ymd_opt(2024, month, 5)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap()
        };
        assert_eq!(rows[0].cell(14), &CellValue::DateTime(date(1, 0)));
        assert_eq!(rows[1].cell(14), &CellValue::DateTime(date(2, 12)));
        assert_eq!(rows[2].cell(14).as_text(), "10/03/2024 08:00:00");

        assert_eq!(rows[0].cell(6).as_text(), "300000");
        assert_eq!(rows[0].cell(19).as_text(), "XL0001");
        assert_eq!(rows[1].cell(3), &CellValue::Empty);
        assert_eq!(rows[1].cell(12).as_text(), "Februari");
    }

    #[test]
    fn test_empty_file_is_format_error() {
        let file = write_temp(".csv", b"\n\n");
        let err = open_chunk_reader(file.path(), 10).err().unwrap();
        assert!(matches!(err, ImportError::EmptyFile));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".pdf", b"A,B\n");
        let err = open_chunk_reader(file.path(), 10).err().unwrap();
        assert!(matches!(err, ImportError::UnsupportedFormat(ref ext) if ext == "pdf"));
    }

    #[test]
    fn test_cell_as_text_integral_float() {
        assert_eq!(CellValue::Float(350000.0).as_text(), "350000");
        assert_eq!(CellValue::Float(350.5).as_text(), "350.5");
        assert_eq!(CellValue::text("   "), CellValue::Empty);
    }
}
