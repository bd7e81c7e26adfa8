//! Document management and document-scoped queries.

use std::path::Path;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{
    payload, ArgDefault, ArgKind, ArgSpec, Arguments, HandlerResult, ToolHandler, ToolSpec,
};
use crate::error::ToolError;
use crate::host::HostError;
use crate::session::{Session, DEFAULT_TARGET_DOC, DEFAULT_WORK_DOC};

const DOCUMENT_ARG: ArgSpec = ArgSpec::optional(
    "document",
    ArgKind::String,
    ArgDefault::None,
    "Document name, or 'target', 'work' or 'both' in dual document mode \
     (default: the working document in dual mode, the active document otherwise)",
);

pub(super) const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "new_document",
        description: "Create a new document and make it active.",
        args: &[ArgSpec::optional(
            "name",
            ArgKind::String,
            ArgDefault::Str("Unnamed"),
            "Name for the new document",
        )],
        handler: ToolHandler::Session(new_document),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "list_documents",
        description: "List open documents.",
        args: &[],
        handler: ToolHandler::Session(list_documents),
        attach_snapshot: false,
    },
    ToolSpec {
        name: "list_objects",
        description: "List the objects in a document.",
        args: &[DOCUMENT_ARG],
        handler: ToolHandler::Session(list_objects),
        attach_snapshot: false,
    },
    ToolSpec {
        name: "get_object_info",
        description: "Type, volume, area and bounds of one object.",
        args: &[
            ArgSpec::required("name", ArgKind::String, "Object name"),
            DOCUMENT_ARG,
        ],
        handler: ToolHandler::Session(get_object_info),
        attach_snapshot: false,
    },
    ToolSpec {
        name: "setup_dual_docs",
        description: "Open a reference mesh in a target document next to an empty working \
                      document and show both side by side. Afterwards 'document' arguments \
                      accept 'target', 'work' and 'both'.",
        args: &[
            ArgSpec::required(
                "target_stl_path",
                ArgKind::String,
                "Path of the reference mesh to import",
            ),
            ArgSpec::optional(
                "target_doc_name",
                ArgKind::String,
                ArgDefault::Str(DEFAULT_TARGET_DOC),
                "Name of the reference document",
            ),
            ArgSpec::optional(
                "work_doc_name",
                ArgKind::String,
                ArgDefault::Str(DEFAULT_WORK_DOC),
                "Name of the working document",
            ),
        ],
        handler: ToolHandler::Session(setup_dual_docs),
        attach_snapshot: true,
    },
];

fn new_document(session: &mut Session, args: &Arguments) -> HandlerResult {
    let requested = args.str("name").unwrap_or("Unnamed");
    let name = session.host_mut().new_document(requested)?;
    Ok(payload(json!({
        "document": name,
        "message": format!("Created new document '{name}'"),
    })))
}

fn list_documents(session: &mut Session, _: &Arguments) -> HandlerResult {
    let host = session.host();
    let documents = host.list_documents();
    Ok(payload(json!({
        "count": documents.len(),
        "documents": documents,
        "active_document": host.active_document(),
    })))
}

fn list_objects(session: &mut Session, args: &Arguments) -> HandlerResult {
    let documents = session.resolve_documents(args.str("document"))?;
    let mut entries = documents
        .iter()
        .map(|document| -> Result<Value, ToolError> {
            let objects = session.host().list_objects(document)?;
            Ok(json!({
                "document": document,
                "count": objects.len(),
                "objects": objects,
            }))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if entries.len() == 1 {
        return Ok(payload(entries.remove(0)));
    }
    Ok(payload(json!({ "documents": entries })))
}

fn get_object_info(session: &mut Session, args: &Arguments) -> HandlerResult {
    let name = args.required_str("name")?;
    let documents = session.resolve_documents(args.str("document"))?;

    if let [document] = documents.as_slice() {
        let info = session.host().object_info(document, name)?;
        return Ok(payload(json!({ "document": document, "info": info })));
    }

    // Both documents: report per document, failing only if neither has it.
    let mut found = false;
    let entries: Vec<Value> = documents
        .iter()
        .map(|document| match session.host().object_info(document, name) {
            Ok(info) => {
                found = true;
                json!({ "document": document, "info": info })
            }
            Err(e) => json!({ "document": document, "error": e.to_string() }),
        })
        .collect();
    if !found {
        return Err(ToolError::NotFound(format!(
            "Object '{name}' not found in {}",
            documents.join(" or ")
        )));
    }
    Ok(payload(json!({ "documents": entries })))
}

fn setup_dual_docs(session: &mut Session, args: &Arguments) -> HandlerResult {
    let path = Path::new(args.required_str("target_stl_path")?);
    if !path.is_file() {
        return Err(HostError::FileNotFound(path.to_path_buf()).into());
    }
    let target_name = args.str("target_doc_name").unwrap_or(DEFAULT_TARGET_DOC);
    let work_name = args.str("work_doc_name").unwrap_or(DEFAULT_WORK_DOC);
    if target_name == work_name {
        return Err(ToolError::invalid(
            "work_doc_name",
            "must differ from target_doc_name",
        ));
    }

    let host = session.host_mut();
    let target = host.new_document(target_name)?;
    let reference = host.import_reference_mesh(&target, path)?;
    let work = host.new_document(work_name)?;
    host.set_active_document(&work)?;
    let split_view = match host.set_split_view(&target, &work) {
        Ok(()) => true,
        Err(e) => {
            session.diagnostics().record_camera_failure();
            warn!(error = %e, "Could not arrange split view");
            false
        }
    };

    info!(%target, %work, path = %path.display(), "Dual documents ready");
    session.enable_dual_mode(target.clone(), work.clone());
    Ok(payload(json!({
        "target_doc": target,
        "work_doc": work,
        "reference_object": reference,
        "split_view": split_view,
        "message": format!(
            "Reference loaded into '{target}', build in '{work}'. Use document='target', \
             'work' or 'both' to address them"
        ),
    })))
}
