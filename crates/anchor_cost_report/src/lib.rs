//! Stitched cost report output: the cumulative CSV and a static HTML summary.

use anchor_cost::chain::format_minute;
use anchor_cost::stitch::smooth;
use anchor_cost::{ReportData, StitchedRow};
use std::io::Write;
use std::path::Path;

const CSV_HEADER: [&str; 7] = [
    "Block",
    "Time",
    "Price",
    "Fee",
    "FeeUSD",
    "Cumulative",
    "CumulativeUSD",
];

/// Write `Block,Time,Price,Fee,FeeUSD,Cumulative,CumulativeUSD` rows.
pub fn write_stitch_csv<W: Write>(rows: &[StitchedRow], out: W) -> Result<(), ReportError> {
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    w.write_record(CSV_HEADER).map_err(ReportError::Csv)?;
    for r in rows {
        w.write_record([
            r.height.to_string(),
            r.time.map(format_minute).unwrap_or_default(),
            format!("{:.6}", r.price),
            format!("{:.6}", r.fee),
            format!("{:.6}", r.fee_usd),
            format!("{:.6}", r.cumulative_fee),
            format!("{:.6}", r.cumulative_usd),
        ])
        .map_err(ReportError::Csv)?;
    }
    w.flush().map_err(ReportError::Io)?;
    Ok(())
}

pub fn render_stitch_csv(
    rows: &[StitchedRow],
    out_path: impl AsRef<Path>,
) -> Result<(), ReportError> {
    let f = std::fs::File::create(out_path.as_ref()).map_err(ReportError::Io)?;
    write_stitch_csv(rows, std::io::BufWriter::new(f))
}

/// Render a static HTML report to `out_path`. Embeds the summary JSON.
pub fn render_report(data: &ReportData, out_path: impl AsRef<Path>) -> Result<(), ReportError> {
    let html = build_html(data)?;
    let mut f = std::fs::File::create(out_path.as_ref()).map_err(ReportError::Io)?;
    f.write_all(html.as_bytes()).map_err(ReportError::Io)?;
    Ok(())
}

/// Build HTML string from report data (for testing or in-memory use).
pub fn build_html(data: &ReportData) -> Result<String, ReportError> {
    let summary = &data.stitched.summary;
    let rows = &data.stitched.rows;
    let json_embed = serde_json::to_string(summary).map_err(ReportError::Json)?;
    let symbol = escape_html(&summary.symbol);

    let trend = smooth(rows.iter().map(|r| r.fee_usd), data.sma_window);
    let mut table = String::new();
    for (r, avg) in rows.iter().zip(&trend) {
        let time = r.time.map(format_minute).unwrap_or_else(|| "—".to_string());
        let price = if r.price > 0.0 {
            format!("{:.2}", r.price)
        } else {
            "—".to_string()
        };
        table.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.8}</td><td>{:.2}</td><td>{:.2}</td><td>{:.8}</td><td>{:.2}</td></tr>\n",
            r.height, time, price, r.fee, r.fee_usd, avg, r.cumulative_fee, r.cumulative_usd
        ));
    }
    let avg_usd = if summary.rows > 0 {
        format!("{:.2}", summary.total_usd / summary.rows as f64)
    } else {
        "—".to_string()
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<meta name="viewport" content="width=device-width,initial-scale=1"/>
<title>Anchor cost – {symbol}</title>
<style>
:root {{ font-family: system-ui, sans-serif; background: #0f1419; color: #e6edf3; }}
body {{ max-width: 960px; margin: 0 auto; padding: 1.5rem; }}
h1 {{ font-size: 1.4rem; margin-bottom: 0.5rem; }}
h2 {{ font-size: 1.1rem; margin-top: 1.5rem; color: #8b949e; }}
.mono {{ font-family: ui-monospace, monospace; font-size: 0.9em; }}
.card {{ background: #161b22; border: 1px solid #30363d; border-radius: 6px; padding: 1rem; margin: 0.5rem 0; }}
.grid {{ display: grid; grid-template-columns: auto 1fr; gap: 0.25rem 1rem; }}
.label {{ color: #8b949e; }}
table {{ width: 100%; border-collapse: collapse; font-size: 0.85rem; }}
td, th {{ padding: 0.2rem 0.4rem; text-align: right; border-bottom: 1px solid #30363d; }}
.footer {{ margin-top: 2rem; font-size: 0.85rem; color: #8b949e; }}
</style>
</head>
<body>
<h1>Anchor Cost Report – {symbol}</h1>
<p>Generated: {created}</p>

<h2>Summary</h2>
<div class="card">
  <div class="grid">
    <span class="label">Anchors</span><span class="mono">{count}</span>
    <span class="label">Total fee ({symbol})</span><span class="mono">{total_fee:.8}</span>
    <span class="label">Total fee (USD)</span><span class="mono">{total_usd:.2}</span>
    <span class="label">Average per anchor (USD)</span><span class="mono">{avg_usd}</span>
    <span class="label">Price resolution</span><span class="mono">{resolution:?}</span>
    <span class="label">Rows without price</span><span class="mono">{missing_price}</span>
    <span class="label">Rows without block time</span><span class="mono">{missing_time}</span>
  </div>
</div>

<h2>Ledger</h2>
<div class="card">
<table>
<tr><th>Block</th><th>Time</th><th>Price</th><th>Fee</th><th>Fee USD</th><th>Fee USD (SMA {window})</th><th>Cumulative</th><th>Cumulative USD</th></tr>
{table}</table>
</div>

<script type="application/json" id="stitch-summary">{json_embed}</script>
<div class="footer">
  <p>Read-only tool; prices are high/low midpoints; missing prices count as zero.</p>
</div>
</body>
</html>"#,
        symbol = symbol,
        created = escape_html(&data.created_utc_rfc3339),
        count = summary.rows,
        total_fee = summary.total_fee,
        total_usd = summary.total_usd,
        avg_usd = avg_usd,
        resolution = summary.resolution,
        missing_price = summary.missing_price,
        missing_time = summary.missing_time,
        window = data.sma_window.max(1),
        table = table,
        json_embed = escape_json_in_script(&json_embed),
    );
    Ok(html)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Script bodies are raw text; only a closing tag can break out.
fn escape_json_in_script(s: &str) -> String {
    s.replace("</", "<\\/")
}

#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "io: {}", e),
            ReportError::Csv(e) => write!(f, "csv: {}", e),
            ReportError::Json(e) => write!(f, "json: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}
