//! Interactive conflict resolution

use anyhow::Result;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use invsync_types::{Conflict, Resolution, Resolutions};

/// Ask the operator how to resolve one conflicting field
pub fn ask_resolution(conflict: &Conflict) -> Result<Resolution> {
    let items = [
        format!("Use live value ({})", conflict.live_value),
        format!("Keep stored value ({})", conflict.stored_value),
        "Decide later (manual)".to_string(),
    ];
    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "{}.{}",
            style(&conflict.resource_name).cyan(),
            style(conflict.field).bold()
        ))
        .items(&items)
        .default(0)
        .interact()?;

    Ok(match choice {
        0 => Resolution::UseLive,
        1 => Resolution::UseStored,
        _ => Resolution::Manual,
    })
}

/// Build a resolutions map by asking `choose` once per conflict
pub fn collect_resolutions<F>(conflicts: &[Conflict], mut choose: F) -> Result<Resolutions>
where
    F: FnMut(&Conflict) -> Result<Resolution>,
{
    let mut resolutions = Resolutions::new();
    for conflict in conflicts {
        let resolution = choose(conflict)?;
        resolutions
            .entry(conflict.resource_name.clone())
            .or_default()
            .insert(conflict.field, resolution);
    }
    Ok(resolutions)
}
