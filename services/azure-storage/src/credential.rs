// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use blobauth_core::utils::Redact;
use std::fmt::{Debug, Formatter};

/// Account name and base64 encoded account key used by Shared Key authorization.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKeyCredential {
    /// Azure storage account name.
    pub account_name: String,
    /// Azure storage account key, base64 encoded as handed out by the portal.
    pub account_key: String,
}

impl SharedKeyCredential {
    /// Create a new shared key credential.
    pub fn new(account_name: impl Into<String>, account_key: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: account_key.into(),
        }
    }
}

impl Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account_name", &self.account_name)
            .field("account_key", &Redact::from(&self.account_key))
            .finish()
    }
}

/// Client credentials of a service principal.
///
/// Two credentials are the same cache slot iff all three fields are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServicePrincipalCredential {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Directory (tenant) id.
    pub tenant_id: String,
}

impl ServicePrincipalCredential {
    /// Create a new service principal credential.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

impl Debug for ServicePrincipalCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &Redact::from(&self.client_secret))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}
