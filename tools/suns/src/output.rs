//! Renderers for decoded models, register images and model descriptions

use std::io::Write;

use anyhow::Result;
use common::OutputFormat;
use serde::Serialize;
use suns_model::{Dataset, DecodedValue, ModelRegistry, ModelSource, RegisterTable};

/// Streams scan results in one output format
pub enum Renderer<W: Write> {
    Text(W),
    Csv(csv::Writer<W>),
    Sql(W),
}

#[derive(Serialize)]
struct CsvRow<'a> {
    register: u32,
    model_id: u16,
    model: &'a str,
    repeat: Option<usize>,
    point: &'a str,
    #[serde(rename = "type")]
    type_name: String,
    status: &'a str,
    value: String,
    labels: String,
}

impl<W: Write> Renderer<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        match format {
            OutputFormat::Text => Self::Text(out),
            OutputFormat::Csv => Self::Csv(csv::Writer::from_writer(out)),
            OutputFormat::Sql => Self::Sql(out),
        }
    }

    pub fn dataset(&mut self, register: u32, dataset: &Dataset<'_>) -> Result<()> {
        match self {
            Self::Text(out) => {
                writeln!(
                    out,
                    "Model {} ({}) at register {}, length {}{}",
                    dataset.model_id(),
                    dataset.name(),
                    register,
                    dataset.declared_len,
                    if dataset.partial { " [partial]" } else { "" }
                )?;
                for value in &dataset.values {
                    let labels = value.labels();
                    write!(out, "  {:<24} {}", point_label(value), value.value)?;
                    if !labels.is_empty() {
                        write!(out, " [{}]", labels.join(", "))?;
                    }
                    writeln!(out)?;
                }
                for diagnostic in &dataset.diagnostics {
                    writeln!(out, "  ! {}", diagnostic)?;
                }
                writeln!(out)?;
            },
            Self::Csv(writer) => {
                for value in &dataset.values {
                    writer.serialize(CsvRow {
                        register,
                        model_id: dataset.model_id(),
                        model: dataset.name(),
                        repeat: value.repeat,
                        point: value.name(),
                        type_name: value.point.spec.to_string(),
                        status: value.value.status().as_str(),
                        value: value.value.to_string(),
                        labels: value.labels().join("|"),
                    })?;
                }
            },
            Self::Sql(out) => {
                for value in &dataset.values {
                    writeln!(
                        out,
                        "INSERT INTO suns_values (model_id, model, repeat, point, type, status, value) \
                         VALUES ({}, {}, {}, {}, {}, {}, {});",
                        dataset.model_id(),
                        sql_string(dataset.name()),
                        value
                            .repeat
                            .map_or_else(|| "NULL".to_string(), |r| r.to_string()),
                        sql_string(value.name()),
                        sql_string(&value.point.spec.to_string()),
                        sql_string(value.value.status().as_str()),
                        sql_string(&value.value.to_string()),
                    )?;
                }
            },
        }
        Ok(())
    }

    /// An unregistered model; the payload is dumped in text mode when `dump` is set
    pub fn unknown(
        &mut self,
        register: u32,
        model_id: u16,
        length: u16,
        bytes: &[u8],
        dump: bool,
    ) -> Result<()> {
        match self {
            Self::Text(out) => {
                writeln!(
                    out,
                    "Unknown model {} at register {}, length {}",
                    model_id, register, length
                )?;
                if dump {
                    write_hex_dump(out, bytes)?;
                }
                writeln!(out)?;
            },
            Self::Csv(_) => {},
            Self::Sql(out) => {
                writeln!(
                    out,
                    "-- unknown model {} at register {}, length {}",
                    model_id, register, length
                )?;
            },
        }
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        match self {
            Self::Text(mut out) | Self::Sql(mut out) => {
                out.flush()?;
                Ok(out)
            },
            Self::Csv(writer) => writer
                .into_inner()
                .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e.error())),
        }
    }
}

fn point_label(value: &DecodedValue<'_>) -> String {
    match value.repeat {
        Some(repeat) => format!("{}[{}]", value.name(), repeat),
        None => value.name().to_string(),
    }
}

fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Offset-prefixed hex lines, 16 bytes each
pub fn write_hex_dump<W: Write>(out: &mut W, bytes: &[u8]) -> Result<()> {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        writeln!(out, "  {:04x}: {}", row * 16, hex.join(" "))?;
    }
    Ok(())
}

/// `register  hex  decimal` lines of a register image
pub fn write_register_map<W: Write>(out: &mut W, table: &RegisterTable) -> Result<()> {
    for (register, value) in table.iter() {
        writeln!(out, "{:>5}  0x{:04x}  {:>5}", register, value, value)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct PointRow<'a> {
    model_id: u16,
    model: &'a str,
    block: usize,
    repeating: bool,
    point: &'a str,
    #[serde(rename = "type")]
    type_name: &'a str,
    len: Option<u16>,
    offset: Option<u16>,
    defines: String,
}

/// One CSV row per point of every registered model
pub fn export_csv<W: Write>(out: W, registry: &ModelRegistry) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for entry in registry.entries() {
        for (block, def) in entry.model.blocks.iter().enumerate() {
            for point in &def.points {
                let defines: Vec<String> = point
                    .defines
                    .iter()
                    .map(|d| format!("{}={}", d.name, d.value))
                    .collect();
                writer.serialize(PointRow {
                    model_id: entry.id,
                    model: &entry.name,
                    block,
                    repeating: def.repeating,
                    point: &point.name,
                    type_name: point.spec.tag.name(),
                    len: point.spec.len,
                    offset: point.offset,
                    defines: defines.join("|"),
                })?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ModelsDocument {
    models: Vec<ModelSource>,
}

/// Resolved models as a definition document, implied offsets made explicit
pub fn export_yaml<W: Write>(out: W, registry: &ModelRegistry) -> Result<()> {
    let document = ModelsDocument {
        models: registry
            .entries()
            .map(|entry| ModelSource::from_model(entry.id, &entry.name, &entry.model))
            .collect(),
    };
    serde_yaml::to_writer(out, &document)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use suns_model::{build_register_table, parse_definitions, Scanner};

    const DEFINITIONS: &str = r#"
models:
  - id: 1
    name: common
    blocks:
      - points:
          - { name: Mn, type: string, len: 8 }
          - name: St
            type: enum16
            defines:
              - { name: MPPT, value: 4 }
data:
  - name: common
    model: 1
    values:
      Mn: "O'Neil"
      St: MPPT
"#;

    fn render(format: OutputFormat) -> String {
        let definitions = parse_definitions(DEFINITIONS).unwrap();
        let registry = definitions.models.build().unwrap();
        let table = build_register_table(&registry, 40001, &definitions.data).unwrap();
        let report = Scanner::new(&registry, table).scan().unwrap();

        let mut renderer = Renderer::new(format, Vec::new());
        for dataset in report.datasets() {
            renderer.dataset(40003, dataset).unwrap();
        }
        String::from_utf8(renderer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_text_output() {
        let text = render(OutputFormat::Text);
        assert!(text.starts_with("Model 1 (common) at register 40003, length 5\n"));
        assert!(text.contains("  Mn                       O'Neil\n"));
        assert!(text.contains("  St                       4 [MPPT]\n"));
    }

    #[test]
    fn test_csv_output() {
        let csv = render(OutputFormat::Csv);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("register,model_id,model,repeat,point,type,status,value,labels")
        );
        assert_eq!(
            lines.next(),
            Some("40003,1,common,,Mn,string(8),ok,O'Neil,")
        );
        assert_eq!(lines.next(), Some("40003,1,common,,St,enum16,ok,4,MPPT"));
    }

    #[test]
    fn test_sql_output_escapes_quotes() {
        let sql = render(OutputFormat::Sql);
        assert!(sql.contains("VALUES (1, 'common', NULL, 'Mn', 'string(8)', 'ok', 'O''Neil');"));
    }

    #[test]
    fn test_unknown_hex_dump() {
        let mut renderer = Renderer::new(OutputFormat::Text, Vec::new());
        renderer
            .unknown(3, 64000, 1, &[0xfa, 0x00, 0x00, 0x01, 0xbe, 0xef], true)
            .unwrap();
        let text = String::from_utf8(renderer.finish().unwrap()).unwrap();
        assert_eq!(
            text,
            "Unknown model 64000 at register 3, length 1\n  0000: fa 00 00 01 be ef\n\n"
        );
    }

    #[test]
    fn test_register_map() {
        let table = RegisterTable::builder(1).finish().unwrap();
        let mut out = Vec::new();
        write_register_map(&mut out, &table).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "    1  0x5375  21365\n    2  0x6e53  28243\n    3  0xffff  65535\n    4  0x0000      0\n"
        );
    }

    #[test]
    fn test_export() {
        let registry = parse_definitions(DEFINITIONS)
            .unwrap()
            .models
            .build()
            .unwrap();

        let mut csv = Vec::new();
        export_csv(&mut csv, &registry).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert!(csv.contains("1,common,0,false,St,enum16,,7,MPPT=4"));

        let mut yaml = Vec::new();
        export_yaml(&mut yaml, &registry).unwrap();
        let reparsed = parse_definitions(&String::from_utf8(yaml).unwrap()).unwrap();
        assert!(reparsed.errors.is_empty());
        assert_eq!(reparsed.models.build().unwrap().len(), 1);
    }
}
