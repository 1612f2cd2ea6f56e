// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print pretty JSON instead of a table"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON object per line"),
    )
}

fn id_arg(name: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(long)
        .required(true)
        .value_parser(value_parser!(i64))
        .help(help)
}

fn account_cmd() -> Command {
    Command::new("account")
        .about("Manage bank accounts")
        .subcommand(
            Command::new("add")
                .about("Add a bank account")
                .arg(Arg::new("name").long("name").required(true))
                .arg(Arg::new("type").long("type").default_value("bank"))
                .arg(
                    Arg::new("initial")
                        .long("initial")
                        .default_value("0")
                        .help("Opening balance"),
                ),
        )
        .subcommand(json_flags(Command::new("list").about("List bank accounts")))
        .subcommand(
            Command::new("rm")
                .about("Remove an account and all of its transactions")
                .arg(
                    Arg::new("account")
                        .long("account")
                        .required(true)
                        .help("Account id or name"),
                ),
        )
        .subcommand(json_flags(
            Command::new("balances").about("Closing balance of every account"),
        ))
}

fn purpose_cmd() -> Command {
    Command::new("purpose")
        .about("Manage the main / business / specific purpose tree")
        .subcommand(
            Command::new("add")
                .about("Add a purpose")
                .arg(Arg::new("name").long("name").required(true))
                .arg(
                    Arg::new("level")
                        .long("level")
                        .required(true)
                        .value_parser(["main", "business", "specific"]),
                )
                .arg(
                    Arg::new("parent")
                        .long("parent")
                        .value_parser(value_parser!(i64))
                        .help("Parent purpose id (required below main)"),
                ),
        )
        .subcommand(json_flags(
            Command::new("list").about("List every purpose with its path"),
        ))
        .subcommand(json_flags(
            Command::new("tree").about("Selectable purpose tree"),
        ))
        .subcommand(
            Command::new("path")
                .about("Print the root-to-leaf path of a purpose")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .value_parser(value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("rename")
                .about("Rename a purpose")
                .arg(id_arg("id", "id", "Purpose id"))
                .arg(Arg::new("name").long("name").required(true)),
        )
        .subcommand(
            Command::new("deactivate")
                .about("Hide a purpose from selection")
                .arg(id_arg("id", "id", "Purpose id")),
        )
        .subcommand(
            Command::new("activate")
                .about("Make a purpose selectable again")
                .arg(id_arg("id", "id", "Purpose id")),
        )
}

fn tx_fields(cmd: Command) -> Command {
    cmd.arg(Arg::new("date").long("date").help("YYYY-MM-DD"))
        .arg(Arg::new("desc").long("desc").help("Main description"))
        .arg(Arg::new("sub-desc").long("sub-desc"))
        .arg(Arg::new("income").long("income"))
        .arg(Arg::new("expense").long("expense"))
        .arg(Arg::new("payee").long("payee").help("Payer or payee"))
        .arg(
            Arg::new("purpose")
                .long("purpose")
                .value_parser(value_parser!(i64))
                .help("Purpose id at any level"),
        )
        .arg(
            Arg::new("project")
                .long("project")
                .help("Project account id or name"),
        )
        .arg(
            Arg::new("audit-year")
                .long("audit-year")
                .value_parser(value_parser!(i32)),
        )
        .arg(Arg::new("ref").long("ref").help("Reference number"))
}

fn tx_cmd() -> Command {
    Command::new("tx")
        .about("Record and query bank transactions")
        .subcommand(tx_fields(
            Command::new("add").about("Record a transaction").arg(
                Arg::new("account")
                    .long("account")
                    .required(true)
                    .help("Account id or name"),
            ),
        )
        .mut_arg("date", |a| a.required(true))
        .mut_arg("desc", |a| a.required(true)))
        .subcommand(
            tx_fields(
                Command::new("edit")
                    .about("Change fields of a transaction")
                    .arg(id_arg("id", "id", "Transaction id"))
                    .arg(
                        Arg::new("account")
                            .long("account")
                            .help("Move to another account (id or name)"),
                    ),
            )
            .arg(
                Arg::new("clear-purpose")
                    .long("clear-purpose")
                    .action(ArgAction::SetTrue)
                    .conflicts_with("purpose"),
            )
            .arg(
                Arg::new("expect-version")
                    .long("expect-version")
                    .value_parser(value_parser!(i64))
                    .help("Fail if the transaction changed since this version"),
            ),
        )
        .subcommand(
            Command::new("rm")
                .about("Delete a transaction and its split parts")
                .arg(id_arg("id", "id", "Transaction id")),
        )
        .subcommand(json_flags(
            Command::new("list")
                .about("List transactions, newest first")
                .arg(Arg::new("account").long("account"))
                .arg(Arg::new("from").long("from").help("YYYY-MM-DD"))
                .arg(Arg::new("to").long("to").help("YYYY-MM-DD"))
                .arg(
                    Arg::new("purpose")
                        .long("purpose")
                        .value_parser(value_parser!(i64))
                        .help("Purpose id; includes everything below it"),
                )
                .arg(Arg::new("search").long("search"))
                .arg(Arg::new("project").long("project"))
                .arg(
                    Arg::new("audit-year")
                        .long("audit-year")
                        .value_parser(value_parser!(i32)),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize)),
                ),
        ))
        .subcommand(json_flags(
            Command::new("reassign")
                .about("Point many transactions at one purpose")
                .arg(id_arg("purpose", "purpose", "Target purpose id"))
                .arg(
                    Arg::new("ids")
                        .long("ids")
                        .required(true)
                        .num_args(1..)
                        .value_delimiter(',')
                        .value_parser(value_parser!(i64)),
                ),
        ))
}

fn part_arg() -> Arg {
    Arg::new("part")
        .long("part")
        .required(true)
        .action(ArgAction::Append)
        .help("AMOUNT=PURPOSE[:DESCRIPTION]; PURPOSE is an id or MAIN/BUSINESS/SPECIFIC")
}

fn split_cmd() -> Command {
    Command::new("split")
        .about("Split a transaction across purposes")
        .subcommand(
            Command::new("apply")
                .about("Replace the split of a transaction")
                .arg(id_arg("tx", "tx", "Transaction id"))
                .arg(part_arg())
                .arg(
                    Arg::new("expect-version")
                        .long("expect-version")
                        .value_parser(value_parser!(i64)),
                ),
        )
        .subcommand(json_flags(
            Command::new("preview")
                .about("Check parts against a transaction without saving")
                .arg(id_arg("tx", "tx", "Transaction id"))
                .arg(part_arg()),
        ))
        .subcommand(
            Command::new("remove")
                .about("Drop the split and restore the original categorization")
                .arg(id_arg("tx", "tx", "Transaction id")),
        )
        .subcommand(json_flags(
            Command::new("show")
                .about("Show the parts of a transaction")
                .arg(id_arg("tx", "tx", "Transaction id")),
        ))
}

fn balance_cmd() -> Command {
    Command::new("balance").about("Running balances").subcommand(json_flags(
        Command::new("show")
            .about("Running balance after each transaction of an account")
            .arg(
                Arg::new("account")
                    .long("account")
                    .required(true)
                    .help("Account id or name"),
            )
            .arg(
                Arg::new("as-of")
                    .long("as-of")
                    .help("Only print the balance at the end of this date"),
            ),
    ))
}

fn budget_cmd() -> Command {
    Command::new("budget")
        .about("Purpose budgets per fiscal year")
        .subcommand(
            Command::new("create")
                .about("Create a budget")
                .arg(Arg::new("project").long("project").required(true))
                .arg(
                    Arg::new("year")
                        .long("year")
                        .required(true)
                        .value_parser(value_parser!(i32)),
                )
                .arg(Arg::new("total").long("total").required(true)),
        )
        .subcommand(
            Command::new("allocate")
                .about("Set the allocation for a purpose")
                .arg(id_arg("budget", "budget", "Budget id"))
                .arg(id_arg("purpose", "purpose", "Purpose id"))
                .arg(Arg::new("amount").long("amount").required(true)),
        )
        .subcommand(
            Command::new("unallocate")
                .about("Remove the allocation for a purpose")
                .arg(id_arg("budget", "budget", "Budget id"))
                .arg(id_arg("purpose", "purpose", "Purpose id")),
        )
        .subcommand(
            Command::new("set-total")
                .about("Change the total of a budget")
                .arg(id_arg("budget", "budget", "Budget id"))
                .arg(Arg::new("total").long("total").required(true)),
        )
        .subcommand(
            Command::new("set-status")
                .about("Move a budget between draft, active and closed")
                .arg(id_arg("budget", "budget", "Budget id"))
                .arg(
                    Arg::new("status")
                        .long("status")
                        .required(true)
                        .value_parser(["draft", "active", "closed"]),
                ),
        )
        .subcommand(json_flags(
            Command::new("status")
                .about("Live utilization of a budget")
                .arg(id_arg("budget", "budget", "Budget id")),
        ))
        .subcommand(json_flags(
            Command::new("list").about("List budgets").arg(
                Arg::new("year")
                    .long("year")
                    .value_parser(value_parser!(i32)),
            ),
        ))
        .subcommand(
            Command::new("refresh")
                .about("Recompute stored spend figures")
                .arg(id_arg("budget", "budget", "Budget id")),
        )
        .subcommand(
            Command::new("rm")
                .about("Delete a budget and its allocations")
                .arg(id_arg("budget", "budget", "Budget id")),
        )
}

fn project_cmd() -> Command {
    Command::new("project")
        .about("Project ledgers and verification")
        .subcommand(
            Command::new("add")
                .about("Add a project account")
                .arg(Arg::new("name").long("name").required(true))
                .arg(Arg::new("budget").long("budget").default_value("0")),
        )
        .subcommand(json_flags(Command::new("list").about("List projects")))
        .subcommand(
            Command::new("set-status")
                .about("Mark a project active, completed or cancelled")
                .arg(Arg::new("project").long("project").required(true))
                .arg(
                    Arg::new("status")
                        .long("status")
                        .required(true)
                        .value_parser(["active", "completed", "cancelled"]),
                ),
        )
        .subcommand(json_flags(
            Command::new("sync")
                .about("Aggregate the transactions of a project")
                .arg(Arg::new("project").long("project").required(true)),
        ))
        .subcommand(json_flags(
            Command::new("verify")
                .about("Submit a verification snapshot of a project")
                .arg(Arg::new("project").long("project").required(true)),
        ))
        .subcommand(json_flags(
            Command::new("requests")
                .about("List verification requests of a project")
                .arg(Arg::new("project").long("project").required(true)),
        ))
}

fn period_arg() -> Arg {
    Arg::new("period")
        .long("period")
        .required(true)
        .help("YYYY, YYYY-MM or YYYY-MM-DD..YYYY-MM-DD")
}

fn report_cmd() -> Command {
    Command::new("report").about("Financial reports").subcommand(json_flags(
        Command::new("summary")
            .about("Income, expense and budget variance for a period")
            .arg(period_arg())
            .arg(
                Arg::new("budget")
                    .long("budget")
                    .value_parser(value_parser!(i64))
                    .help("Budget whose allocations to compare against"),
            ),
    ))
}

fn format_arg() -> Arg {
    Arg::new("format")
        .long("format")
        .default_value("csv")
        .help("csv or json")
}

fn import_cmd() -> Command {
    Command::new("import")
        .about("Import data from files")
        .subcommand(
            Command::new("transactions")
                .about("Import transactions from CSV")
                .arg(Arg::new("path").long("path").required(true)),
        )
}

fn export_cmd() -> Command {
    Command::new("export")
        .about("Export data to files")
        .subcommand(
            Command::new("transactions")
                .about("Export transactions with their split parts")
                .arg(format_arg())
                .arg(Arg::new("out").long("out").required(true)),
        )
        .subcommand(
            Command::new("report")
                .about("Export a period report")
                .arg(period_arg())
                .arg(
                    Arg::new("budget")
                        .long("budget")
                        .value_parser(value_parser!(i64)),
                )
                .arg(format_arg())
                .arg(Arg::new("out").long("out").required(true)),
        )
}

fn config_cmd() -> Command {
    Command::new("config")
        .about("Read and change settings")
        .subcommand(
            Command::new("get")
                .about("Print one setting")
                .arg(Arg::new("key").required(true)),
        )
        .subcommand(
            Command::new("set")
                .about("Change one setting")
                .arg(Arg::new("key").required(true))
                .arg(Arg::new("value").required(true)),
        )
        .subcommand(json_flags(Command::new("show").about("Print every setting")))
}

pub fn build_cli() -> Command {
    Command::new("chapterledger")
        .about("Chapter bank ledger with split transactions, running balances and purpose budgets")
        .version(clap::crate_version!())
        .subcommand(Command::new("init").about("Create the database if needed"))
        .subcommand(account_cmd())
        .subcommand(purpose_cmd())
        .subcommand(tx_cmd())
        .subcommand(split_cmd())
        .subcommand(balance_cmd())
        .subcommand(budget_cmd())
        .subcommand(project_cmd())
        .subcommand(report_cmd())
        .subcommand(import_cmd())
        .subcommand(export_cmd())
        .subcommand(config_cmd())
        .subcommand(Command::new("doctor").about("Look for inconsistent data"))
}
