use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::info;
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream, StringFormat,
};

use crate::invoice::InvoiceDocument;

// US Letter
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 54.0;

const TITLE_SIZE: f32 = 24.0;
const INVOICE_ID_SIZE: f32 = 14.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 10.0;
const TABLE_HEADER_SIZE: f32 = 12.0;

const LINE_HEIGHT: f32 = 14.0;
const ROW_HEIGHT: f32 = 22.0;
const DETAIL_VALUE_OFFSET: f32 = 144.0;
const TABLE_COLUMNS: [f32; 4] = [216.0, 108.0, 108.0, 108.0];

// Helveticaの平均的な文字幅(フォントサイズ比)
const AVERAGE_GLYPH_WIDTH: f32 = 0.52;

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> Vec<u8> {
        match self {
            Font::Regular => b"F1".to_vec(),
            Font::Bold => b"F2".to_vec(),
        }
    }
}

#[derive(Clone, Copy)]
enum RowStyle {
    Header,
    Body,
    Total,
}

/// 上から順に描画し、収まらなくなったら改ページする。
struct PageWriter {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        // pagesは空にならない
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// `height`分の領域が残っていなければ改ページし、改ページした場合は`true`を返す。
    fn ensure_space(&mut self, height: f32) -> bool {
        if self.y - height >= MARGIN {
            return false;
        }
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
        true
    }

    fn skip(&mut self, height: f32) {
        self.y -= height;
    }

    fn text(&mut self, x: f32, baseline: f32, font: Font, size: f32, text: &str) {
        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font.resource_name()), real(size)],
        ));
        ops.push(Operation::new("Td", vec![real(x), real(baseline)]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_text(text), StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    /// 左端から1行書く。幅に収まらない場合は複数行に折り返す。
    fn line(&mut self, font: Font, size: f32, text: &str) {
        for piece in wrap_text(text, size, PAGE_WIDTH - 2.0 * MARGIN) {
            self.ensure_space(size + 4.0);
            self.y -= size;
            let y = self.y;
            self.text(MARGIN, y, font, size, &piece);
            self.y -= 4.0;
        }
    }

    fn centered_line(&mut self, font: Font, size: f32, text: &str) {
        self.ensure_space(size + 4.0);
        self.y -= size;
        let x = ((PAGE_WIDTH - text_width(text, size)) / 2.0).max(MARGIN);
        let y = self.y;
        self.text(x, y, font, size, text);
        self.y -= 4.0;
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, gray: f32) {
        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("g", vec![real(gray)]));
        ops.push(Operation::new(
            "re",
            vec![real(x), real(y), real(width), real(height)],
        ));
        ops.push(Operation::new("f", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("G", vec![real(0.0)]));
        ops.push(Operation::new("w", vec![real(1.0)]));
        ops.push(Operation::new(
            "re",
            vec![real(x), real(y), real(width), real(height)],
        ));
        ops.push(Operation::new("S", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    fn table_row(&mut self, cells: &[String; 4], style: RowStyle) {
        let table_width: f32 = TABLE_COLUMNS.iter().sum();
        let left = (PAGE_WIDTH - table_width) / 2.0;
        let bottom = self.y - ROW_HEIGHT;
        let (font, size) = match style {
            RowStyle::Header => (Font::Bold, TABLE_HEADER_SIZE),
            RowStyle::Body => (Font::Regular, BODY_SIZE),
            RowStyle::Total => (Font::Bold, BODY_SIZE),
        };

        let mut x = left;
        for (index, (cell, width)) in cells.iter().zip(TABLE_COLUMNS).enumerate() {
            match style {
                RowStyle::Header => self.fill_rect(x, bottom, width, ROW_HEIGHT, 0.5),
                // 合計行は金額の列以外を塗る
                RowStyle::Total if index < cells.len() - 1 => {
                    self.fill_rect(x, bottom, width, ROW_HEIGHT, 0.83)
                }
                _ => {}
            }
            self.stroke_rect(x, bottom, width, ROW_HEIGHT);

            let text = fit_text(cell, size, width - 8.0);
            let text_x = x + (width - text_width(&text, size)) / 2.0;
            let baseline = bottom + (ROW_HEIGHT - size) / 2.0 + 2.0;
            if let RowStyle::Header = style {
                // 見出しは白文字
                self.ops().push(Operation::new("q", vec![]));
                self.ops().push(Operation::new("g", vec![real(0.96)]));
                self.text(text_x, baseline, font, size, &text);
                self.ops().push(Operation::new("Q", vec![]));
            } else {
                self.text(text_x, baseline, font, size, &text);
            }
            x += width;
        }
        self.y = bottom;
    }
}

/// 請求書の内容をPDFにレイアウトし、そのバイト列を返す。
pub fn render(document: &InvoiceDocument) -> Result<Vec<u8>> {
    let mut writer = PageWriter::new();

    writer.centered_line(Font::Bold, TITLE_SIZE, &document.title);
    writer.skip(30.0);
    writer.centered_line(Font::Regular, INVOICE_ID_SIZE, &document.invoice_label);
    writer.skip(30.0);

    let value_width = PAGE_WIDTH - 2.0 * MARGIN - DETAIL_VALUE_OFFSET;
    for (label, value) in &document.details {
        let pieces = wrap_text(value, BODY_SIZE, value_width);
        for (index, piece) in pieces.iter().enumerate() {
            writer.ensure_space(LINE_HEIGHT);
            writer.skip(LINE_HEIGHT);
            let y = writer.y;
            if index == 0 {
                writer.text(MARGIN, y, Font::Bold, BODY_SIZE, label);
            }
            writer.text(MARGIN + DETAIL_VALUE_OFFSET, y, Font::Regular, BODY_SIZE, piece);
        }
    }
    writer.skip(20.0);

    for block in &document.addresses {
        writer.line(Font::Bold, HEADING_SIZE, &block.heading);
        for line in &block.lines {
            writer.line(Font::Regular, BODY_SIZE, line);
        }
        writer.skip(15.0);
    }
    writer.skip(5.0);

    let rows = document.table_rows();
    let last = rows.len() - 1;
    let header = &rows[0];
    for (index, row) in rows.iter().enumerate() {
        let style = match index {
            0 => RowStyle::Header,
            i if i == last => RowStyle::Total,
            _ => RowStyle::Body,
        };
        // 見出しだけがページ末尾に残らないよう、見出しは次の行と合わせて収める
        let needed = if index == 0 { 2.0 * ROW_HEIGHT } else { ROW_HEIGHT };
        if writer.ensure_space(needed) && index != 0 {
            writer.table_row(header, RowStyle::Header);
        }
        writer.table_row(row, style);
    }

    let bytes = build_document(writer.pages)?;
    info!("Rendered invoice PDF: {} bytes", bytes.len());

    Ok(bytes)
}

/// 請求書をPDFとして`path`に書き出す。親ディレクトリが存在しない場合は作成する。
pub fn write_invoice(document: &InvoiceDocument, path: &Path) -> Result<()> {
    let bytes = render(document).context("Failed to render invoice")?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, bytes)
        .with_context(|| format!("Failed to write invoice: {}", path.display()))?;
    info!("Wrote invoice to {}", path.display());

    Ok(())
}

fn build_document(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("Failed to encode page content")?,
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "Resources" => resources_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .context("Failed to serialize PDF document")?;

    Ok(bytes)
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

/// WinAnsiEncodingで表せない文字は`?`に置き換える。
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| win_ansi_byte(c).unwrap_or(b'?'))
        .collect()
}

/// 文字をWinAnsiEncoding(CP1252)の1バイトに変換する。
///
/// 0x80..=0x9FはLatin-1の制御文字ではなく、引用符やユーロ記号などに割り当てられている。
fn win_ansi_byte(c: char) -> Option<u8> {
    if matches!(c, '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}') {
        return u8::try_from(u32::from(c)).ok();
    }
    let byte = match c {
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVERAGE_GLYPH_WIDTH
}

/// `width`に収まるよう空白の位置で折り返す。
///
/// 1語で`width`を超える場合は文字の途中で分割する。空の文字列は空の1行とする。
fn wrap_text(text: &str, size: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (size * AVERAGE_GLYPH_WIDTH)) as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for chunk in chars.chunks(max_chars) {
            let chunk: String = chunk.iter().collect();
            if current.is_empty() {
                current = chunk;
            } else if text_width(&current, size) + text_width(" ", size) + text_width(&chunk, size)
                <= width
            {
                current.push(' ');
                current.push_str(&chunk);
            } else {
                lines.push(std::mem::replace(&mut current, chunk));
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }

    lines
}

/// `width`に収まるよう末尾を`...`で切り詰める。
fn fit_text(text: &str, size: f32, width: f32) -> String {
    if text_width(text, size) <= width {
        return text.to_string();
    }
    let max_chars = (width / (size * AVERAGE_GLYPH_WIDTH)) as usize;
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
