//! `OpenAPI` tool source.
//!
//! Ties loading, cataloging, tool mapping and invocation together: one source per configured
//! API, built once at startup and read-only afterwards.

use crate::catalog::OperationCatalog;
use crate::config::ApiServerConfig;
use crate::error::Result;
use crate::invoker::{InvocationResult, OperationInvoker, http_client};
use crate::loader::{document_title, load_document, resolve_base_url, validate_document};
use crate::tools::ToolDefinition;
use reqwest::Client;
use rmcp::model::{CallToolResult, Content, Tool};
use serde_json::Value;
use std::sync::Arc;

/// `OpenAPI` tool source that exposes HTTP API operations as MCP tools.
#[derive(Debug, Clone)]
pub struct OpenApiToolSource {
    /// Source name (used for logs).
    name: String,
    title: Option<String>,
    definitions: Vec<ToolDefinition>,
    invoker: OperationInvoker,
}

impl OpenApiToolSource {
    /// Load the document named by `config.spec` and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be loaded or validated, or if no base URL can be
    /// determined ([`crate::error::OpenApiOpsError::NoBaseUrl`]).
    pub async fn build(name: impl Into<String>, config: ApiServerConfig) -> Result<Self> {
        let client = http_client(&config)?;
        let document = load_document(&client, &config).await?;
        Self::assemble(name.into(), &config, &document, client)
    }

    /// Build the source from an already-parsed document.
    ///
    /// # Errors
    ///
    /// Same as [`Self::build`], minus loading.
    pub fn from_document(
        name: impl Into<String>,
        config: &ApiServerConfig,
        document: &Value,
    ) -> Result<Self> {
        let name = name.into();
        validate_document(&name, document)?;
        let client = http_client(config)?;
        Self::assemble(name, config, document, client)
    }

    fn assemble(
        name: String,
        config: &ApiServerConfig,
        document: &Value,
        client: Client,
    ) -> Result<Self> {
        let base_url = resolve_base_url(config, document)?;
        let catalog = Arc::new(OperationCatalog::build(document));
        let definitions: Vec<ToolDefinition> = catalog
            .operations()
            .iter()
            .map(ToolDefinition::from_contract)
            .collect();

        tracing::info!(
            source = %name,
            base_url = %base_url,
            "Discovered {} operations",
            definitions.len()
        );

        let invoker = OperationInvoker::with_client(catalog, client, base_url, &config.headers)?;
        Ok(Self {
            name,
            title: document_title(document),
            definitions,
            invoker,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `info.title` of the loaded document.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.invoker.base_url()
    }

    #[must_use]
    pub fn catalog(&self) -> &OperationCatalog {
        self.invoker.catalog()
    }

    /// Tool definitions in catalog order.
    #[must_use]
    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// MCP tools in catalog order, annotated from each operation's HTTP method.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.definitions
            .iter()
            .filter_map(|def| {
                let contract = self.catalog().lookup(&def.name)?;
                Some(def.clone().into_mcp_tool(contract))
            })
            .collect()
    }

    /// Invoke an operation and return the typed result.
    ///
    /// # Errors
    ///
    /// See [`OperationInvoker::invoke`].
    pub async fn invoke(&self, operation_id: &str, arguments: &Value) -> Result<InvocationResult> {
        self.invoker.invoke(operation_id, arguments).await
    }

    /// Invoke an operation and translate the outcome into a tool-call result.
    ///
    /// Failures become `is_error = true` results carrying the error message.
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> CallToolResult {
        match self.invoke(name, arguments).await {
            Ok(result) => {
                let structured = serde_json::to_value(&result).unwrap_or(Value::Null);
                let text =
                    serde_json::to_string(&structured).unwrap_or_else(|_| structured.to_string());
                CallToolResult {
                    content: vec![Content::text(text)],
                    structured_content: Some(structured),
                    is_error: Some(false),
                    meta: None,
                }
            }
            Err(e) => {
                tracing::warn!(source = %self.name, tool = name, "tool call failed: {e}");
                CallToolResult {
                    content: vec![Content::text(e.to_string())],
                    structured_content: None,
                    is_error: Some(true),
                    meta: None,
                }
            }
        }
    }
}
