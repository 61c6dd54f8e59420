use crate::content::{ContentItem, RankValue};
use crate::identity::ViewerIdentity;
use crate::page::{Card, ContentList, PageState};

pub const PLACEHOLDER_PICTURE: &str = "https://placehold.co/80x80/EFEFEF/333333?text=User";
pub const GUEST_NAME: &str = "ゲスト";
pub const MISSING_VALUE: &str = "---";
pub const NO_CONTENT_MESSAGE: &str = "現在閲覧できるコンテンツはありません。";
pub const UNTITLED: &str = "無題のコンテンツ";
pub const DEFAULT_ICON: &str = "🔗";

const TYPE_ICONS: &[(&str, &str)] = &[
    ("動画", "🎥"),
    ("資料 (PDF)", "📄"),
    ("テキスト/Wiki", "✍️"),
    ("テンプレート/資料", "📝"),
    ("サービス", "🤝"),
];

/// Project the viewer, their rank and their content list onto the page.
pub fn update_page(
    page: &mut PageState,
    viewer: &ViewerIdentity,
    rank: Option<&RankValue>,
    items: &[ContentItem],
) {
    page.picture_src = viewer
        .picture_url
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| PLACEHOLDER_PICTURE.to_string());
    page.user_name = if viewer.display_name.is_empty() {
        GUEST_NAME.to_string()
    } else {
        viewer.display_name.clone()
    };
    page.rank_text = rank
        .and_then(RankValue::display)
        .unwrap_or_else(|| MISSING_VALUE.to_string());
    page.content_list = if items.is_empty() {
        ContentList::Empty(NO_CONTENT_MESSAGE.to_string())
    } else {
        ContentList::Cards(items.iter().map(content_card).collect())
    };
}

pub fn content_card(item: &ContentItem) -> Card {
    let primary = item.kind.as_ref().and_then(|k| k.primary());
    let type_text = item
        .kind
        .as_ref()
        .map(|k| k.joined())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| MISSING_VALUE.to_string());
    Card {
        href: item.url.clone(),
        icon: icon_for(primary),
        title: item
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string()),
        type_text,
    }
}

pub fn icon_for(category: Option<&str>) -> &'static str {
    category
        .and_then(|c| {
            TYPE_ICONS
                .iter()
                .find(|(label, _)| *label == c)
                .map(|(_, icon)| *icon)
        })
        .unwrap_or(DEFAULT_ICON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ItemKind;

    fn viewer() -> ViewerIdentity {
        ViewerIdentity {
            id: "U1".into(),
            display_name: "Taro".into(),
            picture_url: None,
        }
    }

    fn item(title: Option<&str>, url: &str, kind: Option<ItemKind>) -> ContentItem {
        ContentItem {
            title: title.map(str::to_string),
            url: url.into(),
            kind,
        }
    }

    #[test]
    fn empty_list_renders_only_the_empty_message() {
        let mut page = PageState::default();
        update_page(&mut page, &viewer(), None, &[]);
        assert_eq!(
            page.content_list,
            ContentList::Empty(NO_CONTENT_MESSAGE.to_string())
        );
        assert!(page.cards().is_empty());
        assert_eq!(page.rank_text, MISSING_VALUE);
        assert_eq!(page.picture_src, PLACEHOLDER_PICTURE);
    }

    #[test]
    fn one_card_per_item_preserving_source_fields() {
        let items = vec![
            item(Some("Video A"), "https://x/a", Some(ItemKind::One("動画".into()))),
            item(Some("Guide"), "https://x/b", Some(ItemKind::One("資料 (PDF)".into()))),
            item(Some("Wiki"), "https://x/c", Some(ItemKind::One("テキスト/Wiki".into()))),
        ];
        let mut page = PageState::default();
        update_page(&mut page, &viewer(), None, &items);
        let cards = page.cards();
        assert_eq!(cards.len(), items.len());
        for (card, source) in cards.iter().zip(&items) {
            assert_eq!(card.href, source.url);
            assert_eq!(Some(card.title.as_str()), source.title.as_deref());
            assert_eq!(card.type_text, source.kind.as_ref().unwrap().joined());
        }
    }

    #[test]
    fn gold_rank_video_scenario() {
        let items = vec![item(
            Some("Video A"),
            "https://x/a",
            Some(ItemKind::One("動画".into())),
        )];
        let mut page = PageState::default();
        update_page(
            &mut page,
            &viewer(),
            Some(&RankValue::Text("Gold".into())),
            &items,
        );
        assert_eq!(page.rank_text, "Gold");
        assert_eq!(
            page.cards(),
            &[Card {
                href: "https://x/a".into(),
                icon: "🎥",
                title: "Video A".into(),
                type_text: "動画".into(),
            }]
        );
    }

    #[test]
    fn icon_lookup_is_exact_with_default_fallback() {
        assert_eq!(icon_for(Some("サービス")), "🤝");
        assert_eq!(icon_for(Some("テンプレート/資料")), "📝");
        assert_eq!(icon_for(Some("動画 ")), DEFAULT_ICON);
        assert_eq!(icon_for(Some("podcast")), DEFAULT_ICON);
        assert_eq!(icon_for(None), DEFAULT_ICON);
    }

    #[test]
    fn multi_category_uses_first_icon_and_joins_labels() {
        let card = content_card(&item(
            None,
            "https://x/m",
            Some(ItemKind::Many(vec!["サービス".into(), "動画".into()])),
        ));
        assert_eq!(card.icon, "🤝");
        assert_eq!(card.type_text, "サービス, 動画");
        assert_eq!(card.title, UNTITLED);
    }

    #[test]
    fn missing_type_falls_back_to_placeholder() {
        let card = content_card(&item(Some("Loose"), "https://x/l", None));
        assert_eq!(card.icon, DEFAULT_ICON);
        assert_eq!(card.type_text, MISSING_VALUE);
    }

    #[test]
    fn blank_display_name_shows_guest_label() {
        let mut page = PageState::default();
        let anonymous = ViewerIdentity {
            display_name: String::new(),
            picture_url: Some("https://profile.example/p.png".into()),
            ..viewer()
        };
        update_page(&mut page, &anonymous, None, &[]);
        assert_eq!(page.user_name, GUEST_NAME);
        assert_eq!(page.picture_src, "https://profile.example/p.png");
    }
}
