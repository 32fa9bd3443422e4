use super::*;

#[test]
fn insert_at_position_uses_index_inside_bounds() {
    let mut list = vec!['a', 'b', 'c'];
    insert_at_position(&mut list, 1, 'x');
    assert_eq!(list, vec!['a', 'x', 'b', 'c']);
}

#[test]
fn insert_at_position_appends_out_of_bounds_or_negative() {
    let mut list = vec!['a'];
    insert_at_position(&mut list, 7, 'x');
    insert_at_position(&mut list, -1, 'y');
    insert_at_position(&mut list, 3, 'z');
    assert_eq!(list, vec!['a', 'x', 'y', 'z']);
}

#[test]
fn card_patch_serializes_only_set_fields_and_explicit_nulls() {
    let patch = CardPatch { title: Some("New".into()), due_date: Some(None), ..CardPatch::default() };
    let json = serde_json::to_value(&patch).unwrap();
    assert_eq!(json, serde_json::json!({"title": "New", "due_date": null}));
}

#[test]
fn card_patch_detects_moves() {
    let move_cat = CardPatch { category_id: Some("b".into()), ..CardPatch::default() };
    let same_cat = CardPatch { category_id: Some("a".into()), ..CardPatch::default() };
    let move_board = CardPatch { board_id: Some("board-2".into()), ..CardPatch::default() };
    assert!(move_cat.moves_from("board-1", "a"));
    assert!(!same_cat.moves_from("board-1", "a"));
    assert!(move_board.moves_from("board-1", "a"));
    assert!(!CardPatch::default().moves_from("board-1", "a"));
}

#[test]
fn card_row_decodes_with_defaults() {
    let card: Card = serde_json::from_value(serde_json::json!({
        "id": "c1", "board_id": "b1", "category_id": "k1", "title": "T",
        "created_by": "u1", "created_at": "2024-05-01T10:00:00Z", "position": 2
    }))
    .unwrap();
    assert!(card.tags.is_empty());
    assert_eq!(card.priority, None);
    assert_eq!(card.updated_at, None);
}

#[test]
fn member_row_without_join_yields_placeholder() {
    let row: BoardMemberRow = serde_json::from_value(serde_json::json!({"board_id": "b1", "user_id": "u9"})).unwrap();
    assert_eq!(row.member(), Member { id: "u9".into(), name: String::new(), avatar_url: String::new() });

    let joined: BoardMemberRow = serde_json::from_value(serde_json::json!({
        "board_id": "b1", "user_id": "u9", "users": {"id": "u9", "name": "Bo", "avatar_url": "x"}
    }))
    .unwrap();
    assert_eq!(joined.member().name, "Bo");
}

#[test]
fn category_patch_board_move_rewrites_card_board_ids() {
    let created_at = time::macros::datetime!(2024-05-01 10:00 UTC);
    let mut category = Category {
        id: "k1".into(),
        board_id: "b1".into(),
        name: "Todo".into(),
        color: "#fff".into(),
        position: 0,
        created_at,
        cards: vec![Card {
            id: "c1".into(),
            board_id: "b1".into(),
            category_id: "k1".into(),
            title: "T".into(),
            description: None,
            priority: None,
            due_date: None,
            tags: Vec::new(),
            created_by: "u1".into(),
            created_at,
            updated_at: None,
            position: 1,
        }],
    };
    CategoryPatch { board_id: Some("b2".into()), ..CategoryPatch::default() }.apply(&mut category);
    assert_eq!(category.board_id, "b2");
    assert_eq!(category.cards[0].board_id, "b2");
}

#[test]
fn next_positions_follow_max_plus_one() {
    let created_at = time::macros::datetime!(2024-05-01 10:00 UTC);
    let mut board = Board::from_row(BoardRow {
        id: "b1".into(),
        name: "B".into(),
        org_id: "o1".into(),
        owner_id: "u1".into(),
        created_at,
    });
    assert_eq!(board.next_category_position(), 0);
    board.categories.push(Category::from_row(CategoryRow {
        id: "k1".into(),
        board_id: "b1".into(),
        name: "Todo".into(),
        color: "#fff".into(),
        position: 4,
        created_at,
    }));
    assert_eq!(board.next_category_position(), 5);
    assert_eq!(board.categories[0].next_card_position(), 1);
}
