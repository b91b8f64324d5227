pub(crate) mod knowledge;
pub(crate) mod location;
pub(crate) mod todo;

use super::ToolRegistry;

/// Assembles the full catalog. A tool that fails to register is logged and
/// skipped; the rest of the catalog still comes up.
pub(crate) fn register_all(registry: &mut ToolRegistry) {
    let results = knowledge::register(registry)
        .into_iter()
        .chain(todo::register(registry))
        .chain(location::register(registry));
    for result in results {
        if let Err(err) = result {
            eprintln!("[registry] skipping tool: {err}");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_catalog_registers_cleanly() {
        let mut registry = ToolRegistry::new(vec![], vec![]);
        register_all(&mut registry);
        let names: Vec<&str> = registry.list(None).iter().map(|t| t.name.as_str()).collect();
        for expected in [
            "add_entry",
            "search_semantic",
            "update_entry_versioned",
            "add_todo_item",
            "delete_all_todo_items",
            "get_time",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }
}
