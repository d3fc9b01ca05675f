//! Drives a running server over real TCP sockets with hand-built MBAP frames

use std::net::SocketAddr;
use std::time::Duration;

use mbserve::*;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;

const UNIT: u8 = 0x01;

fn seeded_store() -> SharedStore {
    let mut store = RegisterStore::create(StoreSizes::default()).unwrap();
    store.seed_identity_holding_registers();
    store.wrap()
}

fn local_config() -> ServerConfig {
    ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
}

fn frame(tx_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&tx_id.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.extend_from_slice(&(pdu.len() as u16 + 1).to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    frame
}

/// read a complete response, returning the transaction id, unit id and PDU
async fn read_response(stream: &mut TcpStream) -> (u16, u8, Vec<u8>) {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(&header[2..4], &[0x00, 0x00], "protocol id");
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    let mut pdu = vec![0u8; length - 1];
    stream.read_exact(&mut pdu).await.unwrap();
    (u16::from_be_bytes([header[0], header[1]]), header[6], pdu)
}

async fn transact(stream: &mut TcpStream, tx_id: u16, pdu: &[u8]) -> Vec<u8> {
    stream.write_all(&frame(tx_id, UNIT, pdu)).await.unwrap();
    let (rx_tx_id, unit_id, pdu) = read_response(stream).await;
    assert_eq!(rx_tx_id, tx_id);
    assert_eq!(unit_id, UNIT);
    pdu
}

async fn expect_silence(stream: &mut TcpStream) {
    let mut buffer = [0u8; 1];
    let result = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buffer)).await;
    assert!(result.is_err(), "unexpected data or close: {result:?}");
}

async fn expect_closed(stream: &mut TcpStream) {
    let mut buffer = [0u8; 16];
    let result = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buffer))
        .await
        .expect("connection was not closed");
    // a reset is as good as an orderly close
    if let Ok(count) = result {
        assert_eq!(count, 0);
    }
}

async fn test_requests_and_responses() {
    let server = spawn_tcp_server_task(local_config(), seeded_store())
        .await
        .unwrap();
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    // holding registers are seeded with their own address
    assert_eq!(
        transact(&mut client, 1, &[0x03, 0x00, 0x64, 0x00, 0x03]).await,
        vec![0x03, 0x06, 0x00, 0x64, 0x00, 0x65, 0x00, 0x66]
    );

    // write single register then read it back
    assert_eq!(
        transact(&mut client, 2, &[0x06, 0x00, 0x32, 0x03, 0xE7]).await,
        vec![0x06, 0x00, 0x32, 0x03, 0xE7]
    );
    assert_eq!(
        transact(&mut client, 3, &[0x03, 0x00, 0x32, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0x03, 0xE7]
    );

    // write multiple coils then read them back
    assert_eq!(
        transact(&mut client, 4, &[0x0F, 0x00, 0x0A, 0x00, 0x0A, 0x02, 0xCD, 0x01]).await,
        vec![0x0F, 0x00, 0x0A, 0x00, 0x0A]
    );
    assert_eq!(
        transact(&mut client, 5, &[0x01, 0x00, 0x0A, 0x00, 0x0A]).await,
        vec![0x01, 0x02, 0xCD, 0x01]
    );

    // write single coil
    assert_eq!(
        transact(&mut client, 6, &[0x05, 0x00, 0x00, 0xFF, 0x00]).await,
        vec![0x05, 0x00, 0x00, 0xFF, 0x00]
    );

    // write multiple registers
    assert_eq!(
        transact(&mut client, 7, &[0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0xCA, 0xFE, 0xBE, 0xEF]).await,
        vec![0x10, 0x00, 0x00, 0x00, 0x02]
    );

    // read/write multiple registers sees its own write
    assert_eq!(
        transact(
            &mut client,
            8,
            &[0x17, 0x00, 0x00, 0x00, 0x03, 0x00, 0x02, 0x00, 0x01, 0x02, 0x12, 0x34]
        )
        .await,
        vec![0x17, 0x06, 0xCA, 0xFE, 0xBE, 0xEF, 0x12, 0x34]
    );

    // mask write
    assert_eq!(
        transact(&mut client, 9, &[0x16, 0x00, 0x02, 0xFF, 0x00, 0x00, 0x56]).await,
        vec![0x16, 0x00, 0x02, 0xFF, 0x00, 0x00, 0x56]
    );
    assert_eq!(
        transact(&mut client, 10, &[0x03, 0x00, 0x02, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0x12, 0x56]
    );

    // discrete inputs and input registers start cleared
    assert_eq!(
        transact(&mut client, 11, &[0x02, 0x00, 0x00, 0x00, 0x03]).await,
        vec![0x02, 0x01, 0x00]
    );
    assert_eq!(
        transact(&mut client, 12, &[0x04, 0x00, 0x07, 0x00, 0x01]).await,
        vec![0x04, 0x02, 0x00, 0x00]
    );

    // unknown function code, connection stays open
    assert_eq!(transact(&mut client, 13, &[0x2B, 0x0E]).await, vec![0xAB, 0x01]);

    // quantity above the limit
    assert_eq!(
        transact(&mut client, 14, &[0x03, 0x00, 0x00, 0x00, 0x7E]).await,
        vec![0x83, 0x03]
    );

    // range past the end of the address space
    assert_eq!(
        transact(&mut client, 15, &[0x01, 0xFF, 0xFF, 0x00, 0x02]).await,
        vec![0x81, 0x02]
    );

    // bad coil value
    assert_eq!(
        transact(&mut client, 16, &[0x05, 0x00, 0x00, 0x12, 0x34]).await,
        vec![0x85, 0x03]
    );

    // still serving after all of the exceptions
    assert_eq!(
        transact(&mut client, 17, &[0x03, 0xFF, 0xFE, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0xFF, 0xFE]
    );

    // bad quantity is reported ahead of a range that also overflows
    assert_eq!(
        transact(&mut client, 18, &[0x03, 0xFF, 0xF0, 0x00, 0x7E]).await,
        vec![0x83, 0x03]
    );

    // read/write whose write lies past the last register changes nothing
    assert_eq!(
        transact(
            &mut client,
            19,
            &[0x17, 0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0x00, 0x01, 0x02, 0x00, 0x00]
        )
        .await,
        vec![0x97, 0x02]
    );
    assert_eq!(
        transact(&mut client, 20, &[0x03, 0x00, 0x00, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0xCA, 0xFE]
    );

    server.shutdown().await;
    expect_closed(&mut client).await;
}

async fn test_out_of_range_for_small_store() {
    let store = RegisterStore::create(StoreSizes::new(8, 8, 8, 8))
        .unwrap()
        .wrap();
    let server = spawn_tcp_server_task(local_config(), store).await.unwrap();
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    assert_eq!(
        transact(&mut client, 1, &[0x03, 0x00, 0x07, 0x00, 0x02]).await,
        vec![0x83, 0x02]
    );
    assert_eq!(
        transact(&mut client, 2, &[0x06, 0x00, 0x08, 0x00, 0x01]).await,
        vec![0x86, 0x02]
    );
    assert_eq!(
        transact(&mut client, 3, &[0x03, 0x00, 0x07, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0x00, 0x00]
    );
}

async fn test_clients_are_served_sequentially() {
    let store = seeded_store();
    let server = spawn_tcp_server_task(local_config(), store.clone())
        .await
        .unwrap();

    let mut first = TcpStream::connect(server.local_addr()).await.unwrap();
    assert_eq!(
        transact(&mut first, 1, &[0x06, 0x00, 0x01, 0xAB, 0xCD]).await,
        vec![0x06, 0x00, 0x01, 0xAB, 0xCD]
    );

    // the second client waits in the backlog until the first disconnects
    let mut second = TcpStream::connect(server.local_addr()).await.unwrap();
    second
        .write_all(&frame(2, UNIT, &[0x03, 0x00, 0x01, 0x00, 0x01]))
        .await
        .unwrap();
    expect_silence(&mut second).await;

    drop(first);

    // the store is kept across connections
    let (tx_id, _, pdu) = read_response(&mut second).await;
    assert_eq!(tx_id, 2);
    assert_eq!(pdu, vec![0x03, 0x02, 0xAB, 0xCD]);

    server.shutdown().await;
    assert_eq!(store.lock().unwrap().holding_registers_mut()[1], 0xABCD);
}

async fn test_once_policy_stops_after_first_client() {
    let mut server = spawn_tcp_server_task(
        local_config().with_policy(ConnectionPolicy::Once),
        seeded_store(),
    )
    .await
    .unwrap();

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert_eq!(
        transact(&mut client, 1, &[0x03, 0x00, 0x00, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0x00, 0x00]
    );
    drop(client);

    tokio::time::timeout(Duration::from_secs(5), server.wait())
        .await
        .expect("server task did not stop");
}

async fn test_unit_id_filter() {
    let server = spawn_tcp_server_task(
        local_config().with_unit_filter(UnitIdFilter::Specific(UnitId::new(UNIT))),
        seeded_store(),
    )
    .await
    .unwrap();
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

    client
        .write_all(&frame(1, 0x02, &[0x03, 0x00, 0x00, 0x00, 0x01]))
        .await
        .unwrap();
    expect_silence(&mut client).await;

    assert_eq!(
        transact(&mut client, 2, &[0x03, 0x00, 0x05, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0x00, 0x05]
    );
}

async fn test_malformed_header_closes_connection() {
    let server = spawn_tcp_server_task(local_config(), seeded_store())
        .await
        .unwrap();

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    client
        .write_all(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01])
        .await
        .unwrap();
    expect_closed(&mut client).await;

    // and the server goes back to accepting connections
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert_eq!(
        transact(&mut client, 1, &[0x03, 0x00, 0x00, 0x00, 0x01]).await,
        vec![0x03, 0x02, 0x00, 0x00]
    );
}

async fn test_bind_failure() {
    let server = spawn_tcp_server_task(local_config(), seeded_store())
        .await
        .unwrap();
    let addr = server.local_addr();

    match spawn_tcp_server_task(ServerConfig::new(addr), seeded_store()).await {
        Err(ServerError::Bind(x, _)) => assert_eq!(x, addr),
        Err(err) => panic!("unexpected error: {err}"),
        Ok(_) => panic!("bound the same address twice"),
    }
}

#[test]
fn can_read_and_write_values() {
    let rt = Runtime::new().unwrap();
    rt.block_on(test_requests_and_responses())
}

#[test]
fn returns_illegal_address_outside_of_store() {
    let rt = Runtime::new().unwrap();
    rt.block_on(test_out_of_range_for_small_store())
}

#[test]
fn serves_clients_one_at_a_time() {
    let rt = Runtime::new().unwrap();
    rt.block_on(test_clients_are_served_sequentially())
}

#[test]
fn once_policy_stops_the_server() {
    let rt = Runtime::new().unwrap();
    rt.block_on(test_once_policy_stops_after_first_client())
}

#[test]
fn ignores_requests_for_other_unit_ids() {
    let rt = Runtime::new().unwrap();
    rt.block_on(test_unit_id_filter())
}

#[test]
fn bad_protocol_id_closes_the_connection() {
    let rt = Runtime::new().unwrap();
    rt.block_on(test_malformed_header_closes_connection())
}

#[test]
fn reports_bind_failure() {
    let rt = Runtime::new().unwrap();
    rt.block_on(test_bind_failure())
}
