// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

mod common;

use std::time::Duration;

use common::{cross_register_keys, spawn_node, test_config, tracing_init, Network};

/// A–B and B–C only; A's put must replicate only as far as its own
/// lookup can directly reach (B), and C must recover the value through
/// a lookup that routes via B, never dialing A directly.
#[tokio::test]
async fn three_node_get_routes_indirectly_through_the_middle_node() {
    tracing_init();
    let network = Network::new();
    network.restrict();

    let b = spawn_node(&network, test_config()).await;

    let mut a_config = test_config();
    a_config.bootstrap_peers = vec![b.id];
    let a = spawn_node(&network, a_config).await;

    let mut c_config = test_config();
    c_config.bootstrap_peers = vec![b.id];
    let c = spawn_node(&network, c_config).await;

    network.allow(a.id, b.id);
    network.allow(b.id, c.id);

    let nodes = [a, b, c];
    cross_register_keys(&nodes);
    let [a, b, c] = nodes;

    // B learns of C, then A learns of B (and, via B, of C) before A puts.
    c.handle.bootstrap().await.expect("c bootstrap");
    b.handle.bootstrap().await.expect("b bootstrap");
    a.handle.bootstrap().await.expect("a bootstrap");

    a.handle
        .put_value(b"/v/foo".to_vec(), b"bar".to_vec())
        .await
        .expect("put_value");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let value = c.handle.get_value(b"/v/foo".to_vec()).await.expect("get_value via B");
    assert_eq!(value, b"bar".to_vec());
}
