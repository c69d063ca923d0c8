use crate::CLAP_STYLING;
use clap::{ArgAction, ArgGroup, arg, command};
use shelfsync_core::settings::DEFAULT_CONFIG_DIR;

fn competitor_arg() -> clap::Arg {
    arg!(-c --"competitor" <COMPETITOR>)
        .required(true)
        .help("Competitor id or name (case-insensitive)")
}

/// Catalog selection options shared by `parse --filter` and `catalog list`.
fn filter_args(requires: Option<&'static str>) -> Vec<clap::Arg> {
    let args = vec![
        arg!(--"name" <TEXT>).help("Name contains this text (case-insensitive)"),
        arg!(-c --"competitor" <COMPETITOR>).help("Competitor id or name"),
        arg!(-C --"category" <ID>)
            .action(ArgAction::Append)
            .help("Category id; repeat for several"),
        arg!(-s --"status" <STATUS>)
            .help("Only entries in this state")
            .value_parser(["pending", "parsed", "error", "delisted"]),
        arg!(--"availability" <TEXT>).help("Availability text, ignoring case"),
        arg!(--"price-from" <PRICE>)
            .help("Lowest price")
            .value_parser(clap::value_parser!(f64)),
        arg!(--"price-to" <PRICE>)
            .help("Highest price")
            .value_parser(clap::value_parser!(f64)),
        arg!(--"problematic" "Failed parses and parses missing price or availability"),
    ];
    args.into_iter()
        .map(|a| {
            let a = a.required(false);
            match requires {
                Some(other) => a.requires(other),
                None => a,
            }
        })
        .collect()
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("shelfsync")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("shelfsync")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "More log output (-v debug, -vv trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            arg!(--"config-dir" <DIR>)
                .required(false)
                .global(true)
                .help("Directory holding the database and settings.json")
                .default_value(DEFAULT_CONFIG_DIR),
        )
        .arg(
            arg!(--"endpoint" <URL>)
                .required(false)
                .global(true)
                .help("Extraction service endpoint, overriding settings.json"),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the shelfsync database and settings on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the shelfsync database")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f - -"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("competitor")
                .about("Manage tracked competitors")
                .subcommand_required(true)
                .subcommand(
                    command!("add")
                        .about("Registers a competitor storefront")
                        .arg(
                            arg!(-n --"name" <NAME>)
                                .required(true)
                                .help("Display name of the competitor"),
                        )
                        .arg(
                            arg!(-u --"url" <URL>)
                                .required(true)
                                .help("Storefront home page"),
                        )
                        .arg(arg!(--"notes" <TEXT>).required(false).help("Free-form notes")),
                )
                .subcommand(command!("list").about("List all competitors")),
        )
        .subcommand(
            command!("categories")
                .about("Inspect and curate a competitor's category tree")
                .subcommand_required(true)
                .subcommand(
                    command!("show")
                        .about("Prints the stored category tree")
                        .arg(competitor_arg()),
                )
                .subcommand(
                    command!("sync")
                        .about(
                            "Crawls the storefront's category tree and merges it into the \
                        stored one. Vanished categories are flagged for review.",
                        )
                        .arg(competitor_arg()),
                )
                .subcommand(
                    command!("add")
                        .about("Adds a manually curated root category")
                        .arg(competitor_arg())
                        .arg(
                            arg!(-n --"name" <NAME>)
                                .required(true)
                                .help("Category name"),
                        )
                        .arg(
                            arg!(-u --"url" <URL>)
                                .required(true)
                                .help("Category page on the competitor's site"),
                        ),
                )
                .subcommand(
                    command!("delete")
                        .about("Removes categories and their subtrees")
                        .arg(competitor_arg())
                        .arg(
                            arg!(-i --"id" <ID>)
                                .required(true)
                                .action(ArgAction::Append)
                                .help("Category id; repeat for several"),
                        ),
                ),
        )
        .subcommand(
            command!("discover")
                .about(
                    "Finds new products in the chosen categories and adds them to the \
                catalog. A detail parse of the new products follows.",
                )
                .arg(competitor_arg())
                .arg(
                    arg!(-C --"category" <ID>)
                        .required(true)
                        .action(ArgAction::Append)
                        .help("Category id to scan; repeat for several"),
                )
                .arg(
                    arg!(--"no-follow-up" "Skip the detail parse of new products")
                        .required(false),
                ),
        )
        .subcommand(
            command!("parse")
                .about(
                    "Extracts product details for catalog entries. Entries parsed before \
                only get price and availability refreshed.",
                )
                .arg(
                    arg!(-p --"product" <ID>)
                        .required(false)
                        .action(ArgAction::Append)
                        .help("Catalog entry id; repeat for several"),
                )
                .arg(
                    arg!(--"pending" "Parse every entry still waiting for its first parse")
                        .required(false),
                )
                .arg(arg!(--"all" "Parse the whole catalog").required(false))
                .arg(
                    arg!(--"filter" "Parse the entries matching the selection options")
                        .required(false),
                )
                .args(filter_args(Some("filter")))
                .group(
                    ArgGroup::new("mode")
                        .args(["product", "pending", "all", "filter"])
                        .required(true),
                ),
        )
        .subcommand(
            command!("catalog")
                .about("Inspect the product catalog")
                .subcommand_required(true)
                .subcommand(
                    command!("list")
                        .about("List catalog entries")
                        .args(filter_args(None)),
                )
                .subcommand(
                    command!("add")
                        .about("Adds a product by URL; it waits for its first parse")
                        .arg(
                            arg!(-u --"url" <URL>)
                                .required(true)
                                .help("Product page"),
                        )
                        .arg(
                            arg!(-n --"name" <NAME>)
                                .required(false)
                                .help("Display name until the first parse"),
                        )
                        .arg(
                            arg!(-c --"competitor" <COMPETITOR>)
                                .required(false)
                                .help("Competitor id or name the product belongs to"),
                        ),
                ),
        )
        .subcommand(
            command!("task")
                .about("Inspect background tasks")
                .subcommand_required(true)
                .subcommand(
                    command!("show")
                        .about("Shows one task")
                        .arg(arg!(<ID>).help("Task id"))
                        .arg(
                            arg!(-f --"format" <FORMAT>)
                                .required(false)
                                .help("Output format")
                                .value_parser(["text", "json"])
                                .default_value("text"),
                        )
                        .arg(
                            arg!(-o --"output" <FILE>)
                                .required(false)
                                .help("Write the report to a file instead of stdout")
                                .value_parser(clap::value_parser!(std::path::PathBuf)),
                        ),
                )
                .subcommand(command!("list").about("List all tasks, newest first")),
        )
}
