use crate::chart;
use crate::formatting::{format_count, format_currency, format_optional_number, format_text};
use crate::models::{ExplainedSectorRecord, PriceBar};
use crate::pipeline::{KeywordSection, MarketSection, MetricTable, RenderModel};
use anyhow::{anyhow, Result};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 10.0;
const CONTENT_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
const CHART_HEIGHT_MM: f32 = 60.0;
const BODY_SIZE: f32 = 10.0;
const HEADING_SIZE: f32 = 13.0;
const TITLE_SIZE: f32 = 16.0;
const LINE_HEIGHT_MM: f32 = 5.0;
// Helvetica at 10pt averages roughly 1.9mm per glyph.
const WRAP_COLUMNS: usize = 98;

/// Renders the dashboard results as a PDF document.
pub fn render_pdf(model: &RenderModel) -> Result<Vec<u8>> {
    let mut writer = ReportWriter::new(&model.title())?;

    writer.title(&model.title());
    writer.text(&format!("Timeframe: {}", model.timeframe));
    writer.gap();

    match &model.market {
        MarketSection::Available(view) => {
            if !view.snapshot.bars.is_empty() {
                writer.heading(&format!("{} Stock Price", model.ticker));
                writer.price_chart(&view.snapshot.bars);
            }
            for table in view.tables() {
                writer.metric_table(table);
            }
        }
        MarketSection::Unavailable { message } => {
            writer.heading("Market Data");
            writer.paragraph(message);
        }
    }
    writer.gap();

    writer.heading("Industry Sector Racial Harm Metrics");
    if model.sectors.is_empty() {
        writer.paragraph(&format!(
            "No sector records matched \"{}\".",
            model.sector_query
        ));
    }
    for entry in &model.sectors {
        writer.sector_record(entry);
    }
    writer.gap();

    writer.heading("Social Justice Screen Results");
    match &model.keyword {
        KeywordSection::Resolved {
            subindustry,
            screen,
            response,
        } => {
            writer.text(&format!("Subindustry: {}", subindustry));
            writer.text(&format!("Social Justice Screen: {}", screen));
            writer.paragraph(&format!("Response: {}", response));
        }
        KeywordSection::Incomplete { message } => writer.paragraph(message),
    }
    writer.gap();

    writer.text(&format!(
        "The last update to report data generated at: {}",
        model.generated_at
    ));
    writer.gap();
    writer.heading("Informational Disclaimer");
    writer.paragraph(&model.disclaimer);

    writer.finish()
}

struct ReportWriter {
    doc: PdfDocumentReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    layer: PdfLayerReference,
    cursor_y: f32,
    pages: usize,
}

impl ReportWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(
            sanitize(title),
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Page 1",
        );
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| anyhow!("failed to load report font: {}", err))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|err| anyhow!("failed to load report font: {}", err))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            regular,
            bold,
            layer,
            cursor_y: PAGE_HEIGHT_MM - MARGIN_MM,
            pages: 1,
        })
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor_y - height >= MARGIN_MM {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor_y = PAGE_HEIGHT_MM - MARGIN_MM;
    }

    fn write(&mut self, text: &str, size: f32, bold: bool, indent: f32) {
        let advance = LINE_HEIGHT_MM * size / BODY_SIZE;
        self.ensure_space(advance);
        self.cursor_y -= advance;
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(
            sanitize(text),
            size,
            Mm(MARGIN_MM + indent),
            Mm(self.cursor_y),
            font,
        );
    }

    fn title(&mut self, text: &str) {
        self.write(text, TITLE_SIZE, true, 0.0);
        self.gap();
    }

    fn heading(&mut self, text: &str) {
        self.ensure_space(LINE_HEIGHT_MM * 3.0);
        self.write(text, HEADING_SIZE, true, 0.0);
    }

    fn text(&mut self, text: &str) {
        self.write(text, BODY_SIZE, false, 0.0);
    }

    fn paragraph(&mut self, text: &str) {
        for line in wrap(text, WRAP_COLUMNS) {
            self.write(&line, BODY_SIZE, false, 0.0);
        }
    }

    fn gap(&mut self) {
        self.cursor_y -= LINE_HEIGHT_MM / 2.0;
    }

    fn metric_table(&mut self, table: &MetricTable) {
        self.ensure_space(LINE_HEIGHT_MM * (table.rows.len() + 1) as f32);
        self.write(&table.heading, BODY_SIZE, true, 0.0);
        for row in &table.rows {
            self.write(&row.label, BODY_SIZE, false, 4.0);
            // Values share the baseline of their label.
            self.layer.use_text(
                sanitize(&row.value),
                BODY_SIZE,
                Mm(MARGIN_MM + 70.0),
                Mm(self.cursor_y),
                &self.regular,
            );
        }
        self.gap();
    }

    fn sector_record(&mut self, entry: &ExplainedSectorRecord) {
        let record = &entry.record;
        self.ensure_space(LINE_HEIGHT_MM * 8.0);
        self.write(
            &format!("Details for {}:", record.sector),
            BODY_SIZE,
            true,
            0.0,
        );
        self.paragraph(&format!(
            "Description: {}",
            format_text(record.description.as_deref())
        ));
        self.text(&format!(
            "Primary Subsector: {}",
            format_text(record.primary_subsector.as_deref())
        ));
        self.text(&format!(
            "Subsector Weight: {}",
            format_optional_number(record.subsector_weight)
        ));
        for explanation in &entry.explanations {
            self.write(
                &format!(
                    "{}: {}",
                    explanation.category.label(),
                    format_count(explanation.code)
                ),
                BODY_SIZE,
                true,
                4.0,
            );
            for line in wrap(&explanation.text, WRAP_COLUMNS - 6) {
                self.write(&line, BODY_SIZE, false, 8.0);
            }
        }
        self.write(
            &format!(
                "Total Score: {}",
                format_optional_number(record.total_score)
            ),
            BODY_SIZE,
            true,
            4.0,
        );
        self.gap();
    }

    fn price_chart(&mut self, bars: &[PriceBar]) {
        self.ensure_space(CHART_HEIGHT_MM + LINE_HEIGHT_MM * 2.0);
        let top = self.cursor_y - LINE_HEIGHT_MM / 2.0;
        let bottom = top - CHART_HEIGHT_MM;

        self.layer
            .set_outline_color(Color::Rgb(Rgb::new(0.75, 0.75, 0.75, None)));
        self.layer.set_outline_thickness(0.5);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_MM), Mm(top)), false),
                (Point::new(Mm(MARGIN_MM), Mm(bottom)), false),
                (
                    Point::new(Mm(MARGIN_MM + CONTENT_WIDTH_MM), Mm(bottom)),
                    false,
                ),
            ],
            is_closed: false,
        });

        let points = chart::project(bars, CONTENT_WIDTH_MM as f64, CHART_HEIGHT_MM as f64);
        if points.len() > 1 {
            self.layer
                .set_outline_color(Color::Rgb(Rgb::new(0.12, 0.35, 0.75, None)));
            self.layer.set_outline_thickness(1.0);
            self.layer.add_line(Line {
                points: points
                    .iter()
                    .map(|(x, y)| {
                        (
                            Point::new(Mm(MARGIN_MM + *x as f32), Mm(top - *y as f32)),
                            false,
                        )
                    })
                    .collect(),
                is_closed: false,
            });
        }

        self.cursor_y = bottom;
        if let Some((low, high)) = chart::close_range(bars) {
            self.text(&format!(
                "Close range: {} - {} ({} bars)",
                format_currency(Some(low)),
                format_currency(Some(high)),
                bars.len()
            ));
        }
        self.gap();
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|err| anyhow!("failed to serialize PDF report: {}", err))
    }
}

/// Builtin PDF fonts only cover Latin-1.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            c if c == '\n' || c == '\r' || c == '\t' => ' ',
            c if (c as u32) < 0x20 || (c as u32) > 0xFF => '?',
            c => c,
        })
        .collect()
}

fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + word_len > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
