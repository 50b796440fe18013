use std::fmt;

use super::schedule::{Attach, Schedule, StageId};

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(f, 0, "schedule {")?;
        for (id, stage) in self.stages() {
            match stage.attach() {
                Attach::Root => fmt_stage(self, id, 1, f)?,
                Attach::Inline => write_line(f, 1, &format!("// {} inlined", stage.name()))?,
                Attach::At { .. } => {}
            }
        }
        write_line(f, 0, "}")
    }
}

fn fmt_stage(
    schedule: &Schedule,
    id: StageId,
    indent: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let stage = schedule.stage(id);
    let leaf = stage.leaf_axes();
    for (depth, &axis) in leaf.iter().enumerate() {
        let iv = schedule.axis(axis);
        let mut line = format!(
            "{} {} in 0..{}",
            iv.annotation.keyword(),
            iv.name,
            iv.extent
        );
        for pragma in &iv.pragmas {
            line.push_str(&format!(" @pragma({pragma})"));
        }
        line.push_str(" {");
        write_line(f, indent + depth, &line)?;
        for child in schedule.attached_at(id, axis) {
            fmt_stage(schedule, child, indent + depth + 1, f)?;
        }
    }
    write_line(
        f,
        indent + leaf.len(),
        &format!("{} [{}]", stage.name(), stage.tag()),
    )?;
    for depth in (0..leaf.len()).rev() {
        write_line(f, indent + depth, "}")?;
    }
    Ok(())
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}
