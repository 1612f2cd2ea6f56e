// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db::db_path;
use crate::utils::{
    DEFAULT_CURRENCY_LABEL, SETTING_KEYS, get_setting, maybe_print_json, pretty_table, required,
    set_setting,
};
use anyhow::Result;
use rusqlite::Connection;
use std::collections::BTreeMap;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("get", sub)) => {
            let key = required::<String>(sub, "key")?;
            match get_setting(conn, key)? {
                Some(v) => println!("{}", v),
                None => println!("{} is not set", key),
            }
        }
        Some(("set", sub)) => {
            let key = required::<String>(sub, "key")?;
            let value = required::<String>(sub, "value")?;
            set_setting(conn, key, value)?;
            println!("{} = {}", key, value.trim());
        }
        Some(("show", sub)) => {
            let settings = current_settings(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &settings)? {
                let rows = settings
                    .iter()
                    .map(|(k, v)| vec![k.clone(), v.clone()])
                    .collect();
                println!("{}", pretty_table(&["Setting", "Value"], rows));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Every known setting with its effective value, plus the database location.
pub fn current_settings(conn: &Connection) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for key in SETTING_KEYS {
        let value = get_setting(conn, key)?.unwrap_or_else(|| match *key {
            "currency_label" => DEFAULT_CURRENCY_LABEL.to_string(),
            "read_only" => "false".to_string(),
            _ => String::new(),
        });
        out.insert(key.to_string(), value);
    }
    out.insert("database".to_string(), db_path()?.display().to_string());
    Ok(out)
}
