//! 表文件的编解码：逗号分隔、首行为表头、一行一条记录。
//!
//! 包含逗号、引号或换行的值会被加引号写出，读回时还原。

use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use tracing::warn;
use crate::core::error::StoreError;
use crate::core::types::Record;

/// 解码后的整张表
#[derive(Debug, Default)]
pub struct Decoded {
    pub header: Vec<String>,
    pub records: Vec<Record>,
}

/// 解码整个文件
///
/// 列数与表头不一致的行会被跳过并记录警告，不会中断读取。
pub fn decode(table: &str, bytes: &[u8]) -> Result<Decoded, StoreError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| StoreError::csv(table, "read", e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    let mut row = StringRecord::new();
    let mut line = 1;
    loop {
        let more = reader
            .read_record(&mut row)
            .map_err(|e| StoreError::csv(table, "read", e))?;
        if !more {
            break;
        }
        line += 1;
        if row.len() != header.len() {
            warn!(
                table,
                line,
                expected = header.len(),
                actual = row.len(),
                "跳过列数不匹配的行"
            );
            continue;
        }
        records.push(Record::from_pairs(header.iter().cloned().zip(row.iter().map(str::to_string))));
    }

    Ok(Decoded { header, records })
}

/// 只读表头
pub fn decode_header(table: &str, bytes: &[u8]) -> Result<Vec<String>, StoreError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(bytes);
    let header = reader
        .headers()
        .map_err(|e| StoreError::csv(table, "read", e))?;
    Ok(header.iter().map(str::to_string).collect())
}

/// 编码若干行，每行以换行结尾
pub fn encode_rows<I, R>(table: &str, op: &'static str, rows: I) -> Result<Vec<u8>, StoreError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| StoreError::csv(table, op, e))?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::io(table, op, e.into_error()))
}

/// 编码整张表：表头加全部记录
pub fn encode_table(table: &str, header: &[String], records: &[Record]) -> Result<Vec<u8>, StoreError> {
    let rows = std::iter::once(header.to_vec()).chain(records.iter().map(|r| r.values_in(header)));
    encode_rows(table, "rewrite", rows)
}
