use crate::core::types::Record;

pub struct TableFormatter;

impl TableFormatter {
    /// 以表头顺序把记录渲染成文本表格
    /// 每列宽度取表头与值中最长者，至少 3 个字符，左右各留 1 个空格
    pub fn format_records(header: &[String], records: &[Record]) -> String {
        let rows: Vec<Vec<String>> = records.iter().map(|r| r.values_in(header)).collect();
        Self::format_table(header, &rows)
    }

    pub fn format_table(header: &[String], rows: &[Vec<String>]) -> String {
        // 按字符数而不是字节数计算宽度
        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count().max(3)).collect();
        for row in rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut result = String::new();
        result.push_str(&Self::format_row(header, &widths));
        result.push('\n');

        result.push('|');
        for width in &widths {
            result.push(' ');
            result.push_str(&"-".repeat(*width));
            result.push_str(" |");
        }
        result.push('\n');

        for row in rows {
            result.push_str(&Self::format_row(row, &widths));
            result.push('\n');
        }
        result
    }

    fn format_row(cells: &[String], widths: &[usize]) -> String {
        let mut line = String::from("|");
        for (cell, width) in cells.iter().zip(widths) {
            let padding = width - cell.chars().count();
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(padding + 1));
            line.push('|');
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_padded_to_the_widest_cell() {
        let header = vec!["id".to_string(), "source".to_string()];
        let records = vec![
            Record::new().with("id", "1").with("source", "Bengaluru"),
            Record::new().with("source", "Pune").with("id", "12"),
        ];
        let expected = "\
| id  | source    |
| --- | --------- |
| 1   | Bengaluru |
| 12  | Pune      |
";
        assert_eq!(TableFormatter::format_records(&header, &records), expected);
    }
}
