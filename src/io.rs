use crate::model::{validate_people, Grade, LeavePeriod, Person, PersonId};
use crate::report::RosterReport;
use crate::state::RosterState;
use anyhow::{bail, Context};
use chrono::{NaiveDate, Weekday};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Import de personnes depuis CSV :
/// header `id,name,grade,wte[,high_intensity_eligible][,fixed_day_off][,leave][,start_date]`.
/// `leave` : `AAAA-MM-JJ/AAAA-MM-JJ;AAAA-MM-JJ`. Un id vide est généré.
pub fn import_people_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Person>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let id = rec.get(0).context("missing id")?.trim();
        let name = rec.get(1).context("missing name")?.trim();
        if name.is_empty() {
            bail!("invalid people row (empty name)");
        }
        let grade: Grade = rec
            .get(2)
            .context("missing grade")?
            .parse()
            .with_context(|| format!("invalid grade for {name}"))?;
        let wte: f64 = rec
            .get(3)
            .context("missing wte")?
            .trim()
            .parse()
            .with_context(|| format!("invalid wte for {name}"))?;

        let mut person = Person::new(name, grade, wte);
        if !id.is_empty() {
            person.id = PersonId::new(id);
        }
        if let Some(flag) = optional(rec.get(4)) {
            person.high_intensity_eligible = parse_bool(flag)
                .with_context(|| format!("invalid high_intensity_eligible value for {name}"))?;
        }
        if let Some(day) = optional(rec.get(5)) {
            person.fixed_day_off = Some(
                day.parse::<Weekday>()
                    .map_err(|_| anyhow::anyhow!("invalid weekday: {day}"))
                    .with_context(|| format!("invalid fixed_day_off value for {name}"))?,
            );
        }
        if let Some(ranges) = optional(rec.get(6)) {
            person.leave = parse_leave(ranges)
                .with_context(|| format!("invalid leave value for {name}"))?;
        }
        if let Some(start) = optional(rec.get(7)) {
            person.start_date = Some(
                parse_date(start).with_context(|| format!("invalid start_date for {name}"))?,
            );
        }
        out.push(person);
    }
    validate_people(&out)?;
    Ok(out)
}

fn optional(cell: Option<&str>) -> Option<&str> {
    cell.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_bool(s: &str) -> anyhow::Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "oui" => Ok(true),
        "false" | "0" | "no" | "n" | "non" => Ok(false),
        _ => bail!("expected boolean"),
    }
}

fn parse_leave(raw: &str) -> anyhow::Result<Vec<LeavePeriod>> {
    raw.split(';')
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| parse_leave_chunk(chunk.trim()))
        .collect()
}

fn parse_leave_chunk(chunk: &str) -> anyhow::Result<LeavePeriod> {
    if let Some((start_raw, end_raw)) = chunk.split_once('/').or_else(|| chunk.split_once("..")) {
        let start = parse_date(start_raw.trim())?;
        let end = parse_date(end_raw.trim())?;
        Ok(LeavePeriod::new(start, end)?)
    } else {
        Ok(LeavePeriod::single(parse_date(chunk)?))
    }
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date: {raw}"))
}

/// Import JSON : tableau de personnes, validé.
pub fn import_people_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Person>> {
    let data = fs::read(&path)
        .with_context(|| format!("reading people {}", path.as_ref().display()))?;
    let people: Vec<Person> = serde_json::from_slice(&data).context("parsing people JSON")?;
    validate_people(&people)?;
    Ok(people)
}

/// Choisit l'import selon l'extension (`.csv`, sinon JSON).
pub fn import_people<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Person>> {
    let is_csv = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        import_people_csv(path)
    } else {
        import_people_json(path)
    }
}

pub fn export_people_json<P: AsRef<Path>>(path: P, people: &[Person]) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(people)?;
    fs::write(path, s)?;
    Ok(())
}

/// Grille CSV : une ligne par jour, une colonne par personne, puis `locum`
/// (types non couverts, `code*n` quand il en manque plusieurs).
pub fn write_grid_csv<W: Write>(
    writer: W,
    people: &[Person],
    state: &RosterState,
) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(writer);
    let mut header = vec!["date".to_string()];
    header.extend(people.iter().map(|p| p.name.clone()));
    header.push("locum".to_string());
    w.write_record(&header)?;

    let columns: Vec<Option<usize>> = people.iter().map(|p| state.person_index(&p.id)).collect();
    for (day, date) in state.dates().iter().enumerate() {
        let mut row = vec![date.to_string()];
        for col in &columns {
            row.push(match col {
                Some(idx) => state.get(day, *idx).code().to_string(),
                None => String::new(),
            });
        }
        let locum: Vec<String> = state
            .gaps()
            .iter()
            .filter(|g| g.date == *date)
            .map(|g| {
                if g.shortfall > 1 {
                    format!("{}*{}", g.kind, g.shortfall)
                } else {
                    g.kind.to_string()
                }
            })
            .collect();
        row.push(locum.join(";"));
        w.write_record(&row)?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_grid_csv<P: AsRef<Path>>(
    path: P,
    people: &[Person],
    state: &RosterState,
) -> anyhow::Result<()> {
    let file = fs::File::create(&path)
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    write_grid_csv(file, people, state)
}

#[derive(Serialize)]
struct RosterDocument<'a> {
    people: &'a [Person],
    state: &'a RosterState,
    report: &'a RosterReport,
}

/// Export JSON du rota (jolie mise en forme) : personnes, grille, synthèse.
pub fn export_roster_json<P: AsRef<Path>>(
    path: P,
    people: &[Person],
    state: &RosterState,
    report: &RosterReport,
) -> anyhow::Result<()> {
    let doc = RosterDocument {
        people,
        state,
        report,
    };
    let s = serde_json::to_string_pretty(&doc)?;
    fs::write(path, s)?;
    Ok(())
}

/// Synthèse CSV : header
/// `id,name,grade,wte,nights,days,night_load,day_load,weekend_days,hours,weekly_hours`
pub fn write_report_csv<W: Write>(writer: W, report: &RosterReport) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(writer);
    w.write_record([
        "id",
        "name",
        "grade",
        "wte",
        "nights",
        "days",
        "night_load",
        "day_load",
        "weekend_days",
        "hours",
        "weekly_hours",
    ])?;
    let mut nights = itoa::Buffer::new();
    let mut days = itoa::Buffer::new();
    let mut night_load = itoa::Buffer::new();
    let mut day_load = itoa::Buffer::new();
    let mut weekend = itoa::Buffer::new();
    let mut hours = itoa::Buffer::new();
    for row in &report.people {
        let grade = row.grade.to_string();
        let wte = format!("{:.2}", row.wte);
        let weekly = format!("{:.1}", row.weekly_hours);
        w.write_record([
            row.id.as_str(),
            row.name.as_str(),
            grade.as_str(),
            wte.as_str(),
            nights.format(row.nights),
            days.format(row.days),
            night_load.format(row.night_load),
            day_load.format(row.day_load),
            weekend.format(row.weekend_days),
            hours.format(row.hours),
            weekly.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_report_csv<P: AsRef<Path>>(path: P, report: &RosterReport) -> anyhow::Result<()> {
    let file = fs::File::create(&path)
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    write_report_csv(file, report)
}
