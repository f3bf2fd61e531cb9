// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because security and privacy guarantees can no longer be upheld";
