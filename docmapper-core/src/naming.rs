//! Collection naming for schema types.

/// Derives a storage collection name from a schema type name.
///
/// Word boundaries in the camel-cased name become underscores, everything is
/// lowercased and an `s` is appended, so `HotelBooking` is stored in
/// `hotel_bookings` and `HTTPRequest` in `http_requests`.
pub fn collection_name(type_name: &str) -> String {
    let chars = type_name.chars().collect::<Vec<_>>();
    let mut snake = String::with_capacity(type_name.len() + 4);

    for (position, current) in chars.iter().enumerate() {
        let next = chars.get(position + 1);

        if current.is_uppercase() && next.is_some_and(|c| c.is_lowercase()) {
            snake.push('_');
            snake.extend(current.to_lowercase());
        } else if current.is_lowercase() && next.is_some_and(|c| c.is_uppercase()) {
            snake.extend(current.to_lowercase());
            snake.push('_');
        } else {
            snake.extend(current.to_lowercase());
        }
    }

    let mut collapsed = String::with_capacity(snake.len() + 1);
    for c in snake.trim_start_matches('_').chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    collapsed.push('s');
    collapsed
}
