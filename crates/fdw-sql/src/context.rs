// SPDX-License-Identifier: Apache-2.0

//! Per-statement view of a foreign table shared by the compiler and the
//! statement builder.

use fdw_core::{
    BridgeContext, ColumnDescriptor, ConversionMode, EffectiveOptions, ForeignTable,
    RemoteSource, RemoteVersion, ServerDescriptor, ServerOptions,
};

use crate::ident::{column_ident, table_ident, RemoteIdent};

#[derive(Debug, Clone, Copy)]
pub struct SqlContext<'a> {
    pub table: &'a ForeignTable,
    pub server: &'a ServerOptions,
    pub effective: EffectiveOptions,
    pub version: RemoteVersion,
}

impl<'a> SqlContext<'a> {
    pub fn new(table: &'a ForeignTable, server: &'a ServerDescriptor, version: RemoteVersion) -> Self {
        Self {
            table,
            server: &server.options,
            effective: table.effective(server),
            version,
        }
    }

    pub fn column(&self, index: usize) -> Option<&'a ColumnDescriptor> {
        self.table.columns.get(index)
    }

    pub fn column_ident(&self, index: usize) -> Option<RemoteIdent> {
        self.column(index)
            .map(|c| column_ident(c, self.effective.quote_identifier))
    }

    pub fn mode(&self, index: usize) -> ConversionMode {
        self.column(index)
            .map(|c| c.conversion_mode(self.server, self.version))
            .unwrap_or(ConversionMode::Plain)
    }

    pub fn bridge(&self) -> BridgeContext {
        BridgeContext::new(self.server, self.version)
    }

    /// `FROM` target: the remote table, or the remote query as a derived table.
    pub fn from_target(&self) -> String {
        match &self.table.source {
            RemoteSource::Query(query) => format!("({query})"),
            RemoteSource::Table(_) => table_ident(self.table, self.effective.quote_identifier)
                .map(|ident| ident.to_string())
                .unwrap_or_default(),
        }
    }

    /// Remote table identifier; `None` for query-defined tables.
    pub fn table_ident(&self) -> Option<RemoteIdent> {
        table_ident(self.table, self.effective.quote_identifier)
    }
}
